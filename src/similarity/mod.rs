// Channel similarity: paired observation vectors, the individual measures,
// their weighted blend and the persisted pair table.

pub mod combined;
pub mod measures;
pub mod relevance;
pub mod store;
pub mod vectors;

pub use combined::{SimilarityBreakdown, SimilarityWeights};
pub use store::{RecalcSummary, SimilaritySettings, SimilarityStore};
