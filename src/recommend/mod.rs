// Recommendations: rating prediction from the similarity table, the
// candidate filter, the cache port and the per-user service on top.

pub mod cache;
pub mod filter;
pub mod scorer;
pub mod service;

pub use cache::{
    CachedCandidates, DatabaseCache, MemoryCache, NoCache, RecommendationCache, CACHE_KEY_PREFIX,
};
pub use scorer::{calculate_scores, Reason, ScoredCandidates};
pub use service::{
    cache_key, count_recommendations, get_recommendations, recommend_from_ratings,
    RecommendationQuery, RecommendationSettings, Recommendations, RecommendedChannel,
};
