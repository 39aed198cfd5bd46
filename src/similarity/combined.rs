// Combined channel similarity: one blended score per channel pair.
//
// The blend is a weighted average of the individual signals:
//
//   (6 * ratings + 3 * language + 1 * categories + w_s * subscriptions) / (10 + w_s)
//
// Subscription co-occurrence is measured but carries no weight unless
// configured, which keeps the stored scores comparable with older tables.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::measures::{cosine, discounted_pearson, jaccard, language_overlap};
use super::vectors::{fetch_ratings_vector, fetch_subscription_vector};
use crate::db::models::Channel;
use crate::db::{RatingRepository, SubscriptionRepository};

/// Weights of each signal in the combined score.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityWeights {
    /// Pearson correlation of shared ratings (default 6.0)
    pub rating: f64,
    /// Language match (default 3.0)
    pub language: f64,
    /// Category overlap (default 1.0)
    pub category: f64,
    /// Cosine of shared subscribers (default 0.0, i.e. measured but unused)
    pub subscription: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            rating: 6.0,
            language: 3.0,
            category: 1.0,
            subscription: 0.0,
        }
    }
}

/// The individual signals behind one combined score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub rating: f64,
    pub language: f64,
    pub category: f64,
    /// `None` when the subscription weight is zero and it was not measured.
    pub subscription: Option<f64>,
}

impl SimilarityWeights {
    fn total(&self) -> f64 {
        self.rating + self.language + self.category + self.subscription
    }

    /// Weighted average of the signals. 0.0 when every weight is zero.
    pub fn blend(&self, parts: &SimilarityBreakdown) -> f64 {
        let total = self.total();
        if total == 0.0 {
            return 0.0;
        }
        let sum = self.rating * parts.rating
            + self.language * parts.language
            + self.category * parts.category
            + self.subscription * parts.subscription.unwrap_or(0.0);
        sum / total
    }
}

/// Measure every signal for a channel pair.
///
/// `subscription_since` bounds the subscription window; it is only consulted
/// when the subscription weight is non-zero.
pub async fn similarity_breakdown<D>(
    db: &D,
    channel: &Channel,
    other: &Channel,
    weights: &SimilarityWeights,
    subscription_since: DateTime<Utc>,
) -> Result<SimilarityBreakdown>
where
    D: RatingRepository + SubscriptionRepository + ?Sized,
{
    let ratings = fetch_ratings_vector(db, channel.id, other.id).await?;
    let subscription = if weights.subscription != 0.0 {
        let presence =
            fetch_subscription_vector(db, channel.id, other.id, subscription_since).await?;
        Some(cosine(&presence.first, &presence.second))
    } else {
        None
    };

    Ok(SimilarityBreakdown {
        rating: discounted_pearson(&ratings.first, &ratings.second),
        language: language_overlap(channel.language.as_deref(), other.language.as_deref()),
        category: jaccard(&channel.categories, &other.categories),
        subscription,
    })
}

/// Combined similarity of two channels, in [-1, 1].
pub async fn get_similarity<D>(
    db: &D,
    channel: &Channel,
    other: &Channel,
    weights: &SimilarityWeights,
    subscription_since: DateTime<Utc>,
) -> Result<f64>
where
    D: RatingRepository + SubscriptionRepository + ?Sized,
{
    let parts = similarity_breakdown(db, channel, other, weights, subscription_since).await?;
    Ok(weights.blend(&parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_blend_ignores_subscriptions() {
        let parts = SimilarityBreakdown {
            rating: 1.0,
            language: 1.0,
            category: 0.5,
            subscription: Some(1.0),
        };
        let score = SimilarityWeights::default().blend(&parts);
        assert!((score - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_subscription_weight_is_normalised() {
        let weights = SimilarityWeights {
            subscription: 10.0,
            ..SimilarityWeights::default()
        };
        let parts = SimilarityBreakdown {
            rating: 1.0,
            language: 1.0,
            category: 1.0,
            subscription: Some(1.0),
        };
        assert!((weights.blend(&parts) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_weights_blend_to_zero() {
        let weights = SimilarityWeights {
            rating: 0.0,
            language: 0.0,
            category: 0.0,
            subscription: 0.0,
        };
        assert_eq!(weights.blend(&SimilarityBreakdown::default()), 0.0);
    }
}
