// Item-based rating prediction from the similarity table.
//
// For every channel the user rated, each stored neighbour the user has not
// rated receives the similarity multiplied by the rating's distance from the
// neutral midpoint. The predicted rating is the similarity-weighted average of
// those deltas, re-centred on the midpoint:
//
//   predicted(n) = sum(sim(c, n) * (r_c - 2.5)) / sum(|sim(c, n)|) + 2.5
//
// Positive signals (ratings above 2) are also kept as "reasons": the rated
// channels that pushed a neighbour's prediction up the most.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::models::{ChannelId, Similarity, Stars};

/// Ratings are centred on this value before weighting.
pub const NEUTRAL_RATING: f64 = 2.5;

/// A rated channel can only be a reason when its rating is above this.
pub const REASON_MIN_STARS: u8 = 2;

/// Reasons kept per recommended channel.
pub const MAX_REASONS: usize = 3;

/// A rated channel's contribution to one neighbour's prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub score: f64,
    pub channel_id: ChannelId,
}

/// Raw scorer output, before the confidence filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredCandidates {
    /// Predicted rating per unrated neighbour.
    pub scores: BTreeMap<ChannelId, f64>,
    /// How many rated channels contributed to each prediction.
    pub num_scores: BTreeMap<ChannelId, usize>,
    /// Up to [`MAX_REASONS`] strongest positive contributions per neighbour,
    /// ascending by score.
    pub reasons: BTreeMap<ChannelId, Vec<Reason>>,
}

#[derive(Default)]
struct Accumulator {
    score: f64,
    total_similarity: f64,
    count: usize,
}

/// Predict ratings for every unrated neighbour of the rated channels.
///
/// `similarities` may contain rows that touch no rated channel; they are
/// ignored. Neighbours whose contributing similarities are all exactly zero
/// have no defined prediction and are left out.
pub fn calculate_scores(
    similarities: &[Similarity],
    ratings: &BTreeMap<ChannelId, Stars>,
) -> ScoredCandidates {
    // rated channel -> (neighbour -> similarity)
    let mut table: BTreeMap<ChannelId, BTreeMap<ChannelId, f64>> = BTreeMap::new();
    for similarity in similarities {
        let (low, high) = (similarity.pair.low(), similarity.pair.high());
        if ratings.contains_key(&low) {
            table.entry(low).or_default().insert(high, similarity.score);
        }
        if ratings.contains_key(&high) {
            table.entry(high).or_default().insert(low, similarity.score);
        }
    }

    let mut totals: BTreeMap<ChannelId, Accumulator> = BTreeMap::new();
    let mut reasons: BTreeMap<ChannelId, Vec<Reason>> = BTreeMap::new();

    for (source, neighbours) in &table {
        let Some(stars) = ratings.get(source) else {
            continue;
        };
        let rating = stars.as_f64();
        for (&neighbour, &similarity) in neighbours {
            if ratings.contains_key(&neighbour) {
                continue;
            }
            let contribution = similarity * (rating - NEUTRAL_RATING);
            let entry = totals.entry(neighbour).or_default();
            entry.score += contribution;
            entry.total_similarity += similarity.abs();
            entry.count += 1;

            if stars.get() > REASON_MIN_STARS {
                reasons.entry(neighbour).or_default().push(Reason {
                    score: contribution,
                    channel_id: *source,
                });
            }
        }
    }

    for list in reasons.values_mut() {
        list.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.channel_id.cmp(&b.channel_id))
        });
        if list.len() > MAX_REASONS {
            list.drain(..list.len() - MAX_REASONS);
        }
    }

    let mut scored = ScoredCandidates::default();
    for (neighbour, acc) in totals {
        scored.num_scores.insert(neighbour, acc.count);
        if acc.total_similarity == 0.0 {
            continue;
        }
        scored
            .scores
            .insert(neighbour, acc.score / acc.total_similarity + NEUTRAL_RATING);
    }
    reasons.retain(|id, _| scored.scores.contains_key(id));
    scored.reasons = reasons;
    scored
}
