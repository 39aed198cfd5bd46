// Affinity: channel similarity and personalized recommendations
//
// This is the library root. Each module corresponds to a stage of the
// engine: storage, pairwise similarity, per-user recommendations, and the
// supporting import/evaluation/output tooling.

pub mod config;
pub mod dataset;
pub mod db;
pub mod evaluate;
pub mod output;
pub mod recommend;
pub mod similarity;
pub mod status;
