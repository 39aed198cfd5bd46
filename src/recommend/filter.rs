// Candidate filter: confidence cut-off plus the channel state check.

use std::collections::BTreeMap;

use anyhow::Result;

use super::scorer::ScoredCandidates;
use crate::db::models::ChannelId;
use crate::db::ChannelRepository;

/// A prediction needs more contributing ratings than this to count as confident.
pub const MIN_CONFIDENT_SCORES: usize = 3;

/// Candidates backed by more than [`MIN_CONFIDENT_SCORES`] contributing ratings.
fn confident(scored: &ScoredCandidates) -> Vec<ChannelId> {
    scored
        .scores
        .keys()
        .copied()
        .filter(|id| scored.num_scores.get(id).copied().unwrap_or(0) > MIN_CONFIDENT_SCORES)
        .collect()
}

/// Candidates backed by enough contributing ratings. When none are, every
/// candidate is returned instead so the user still gets something.
pub fn confident_candidates(scored: &ScoredCandidates) -> Vec<ChannelId> {
    let confident = confident(scored);
    if confident.is_empty() {
        scored.scores.keys().copied().collect()
    } else {
        confident
    }
}

/// Predicted ratings of the confident candidates that are approved and not
/// archived.
///
/// When no candidate is confident the raw scores come back as they are,
/// without the channel state check.
pub async fn filter_scores<C>(repo: &C, scored: &ScoredCandidates) -> Result<BTreeMap<ChannelId, f64>>
where
    C: ChannelRepository + ?Sized,
{
    let ids = confident(scored);
    if ids.is_empty() {
        return Ok(scored.scores.clone());
    }
    let channels = repo.get_channels(&ids).await?;
    Ok(channels
        .into_iter()
        .filter(|c| c.is_recommendable())
        .filter_map(|c| scored.scores.get(&c.id).map(|&score| (c.id, score)))
        .collect())
}
