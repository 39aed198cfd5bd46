// Offline accuracy check of the rating predictor (hold-out RMSE).
//
// Users are split by id parity. Odd ids form the training group, whose
// ratings alone define channel similarity (plain Pearson correlation, no
// small-sample discount). Even ids with more than six ratings form the
// verification group: the older half of each such user's ratings predicts
// the newer half, and the squared errors are averaged.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::db::models::{ChannelId, ChannelPair, Rating, Similarity, Stars, UserId};
use crate::db::RatingRepository;
use crate::recommend::scorer::calculate_scores;
use crate::similarity::measures::pearson;

/// Verification users need more ratings than this.
pub const MIN_VERIFICATION_RATINGS: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub training_users: usize,
    pub verification_users: usize,
    /// Distinct channel pairs whose similarity was computed.
    pub pairs_compared: usize,
    /// Ratings that received a prediction.
    pub predictions: usize,
    /// `None` when nothing could be predicted.
    pub rmse: Option<f64>,
}

/// Run the hold-out evaluation over a full rating dump.
pub fn holdout_rmse(ratings: &[Rating]) -> EvaluationReport {
    let mut by_user: BTreeMap<UserId, Vec<&Rating>> = BTreeMap::new();
    for rating in ratings {
        by_user.entry(rating.user_id).or_default().push(rating);
    }
    for list in by_user.values_mut() {
        list.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.channel_id.cmp(&b.channel_id))
        });
    }

    // channel -> (training user -> rating)
    let mut training: BTreeMap<ChannelId, BTreeMap<UserId, f64>> = BTreeMap::new();
    let mut report = EvaluationReport::default();
    let mut verification: Vec<&Vec<&Rating>> = Vec::new();

    for (&user_id, list) in &by_user {
        if user_id % 2 != 0 {
            report.training_users += 1;
            for rating in list {
                if let Some(stars) = rating.stars {
                    training
                        .entry(rating.channel_id)
                        .or_default()
                        .insert(user_id, stars.as_f64());
                }
            }
        } else if list.len() > MIN_VERIFICATION_RATINGS {
            verification.push(list);
        }
    }
    report.verification_users = verification.len();

    let mut pair_cache: HashMap<ChannelPair, f64> = HashMap::new();
    let mut squared_errors: Vec<f64> = Vec::new();

    for list in verification {
        let (known, hidden) = list.split_at(list.len() / 2);
        let rated: BTreeMap<ChannelId, Stars> = known
            .iter()
            .filter_map(|r| r.stars.map(|s| (r.channel_id, s)))
            .collect();

        let mut similarities = Vec::new();
        for &channel_id in rated.keys() {
            for neighbour in training_neighbours(&training, channel_id) {
                let Some(pair) = ChannelPair::new(channel_id, neighbour) else {
                    continue;
                };
                let score = *pair_cache
                    .entry(pair)
                    .or_insert_with(|| training_pearson(&training, pair));
                similarities.push(Similarity { pair, score });
            }
        }

        let scored = calculate_scores(&similarities, &rated);
        for rating in hidden {
            let (Some(stars), Some(predicted)) =
                (rating.stars, scored.scores.get(&rating.channel_id))
            else {
                continue;
            };
            squared_errors.push((stars.as_f64() - predicted).powi(2));
        }
    }

    report.pairs_compared = pair_cache.len();
    report.predictions = squared_errors.len();
    if !squared_errors.is_empty() {
        let mean = squared_errors.iter().sum::<f64>() / squared_errors.len() as f64;
        report.rmse = Some(mean.sqrt());
    }
    report
}

/// Load every rating and evaluate.
pub async fn evaluate<R: RatingRepository + ?Sized>(repo: &R) -> Result<EvaluationReport> {
    let ratings = repo.all_ratings().await?;
    info!(ratings = ratings.len(), "Running hold-out evaluation");
    Ok(holdout_rmse(&ratings))
}

/// Channels rated by any training user who rated `channel_id`.
fn training_neighbours(
    training: &BTreeMap<ChannelId, BTreeMap<UserId, f64>>,
    channel_id: ChannelId,
) -> Vec<ChannelId> {
    let Some(raters) = training.get(&channel_id) else {
        return Vec::new();
    };
    training
        .iter()
        .filter(|(other, users)| {
            **other != channel_id && users.keys().any(|u| raters.contains_key(u))
        })
        .map(|(&other, _)| other)
        .collect()
}

fn training_pearson(training: &BTreeMap<ChannelId, BTreeMap<UserId, f64>>, pair: ChannelPair) -> f64 {
    let (Some(a), Some(b)) = (training.get(&pair.low()), training.get(&pair.high())) else {
        return 0.0;
    };
    let (mut v1, mut v2) = (Vec::new(), Vec::new());
    for (user, rating) in a {
        if let Some(other) = b.get(user) {
            v1.push(*rating);
            v2.push(*other);
        }
    }
    pearson(&v1, &v2)
}
