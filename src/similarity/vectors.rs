// Paired observation vectors between two channels.
//
// Ratings are keyed by user, subscriptions by subscriber IP. Keys are kept in
// a BTreeMap so both vectors come out aligned position by position.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::models::{ChannelId, Rating, Stars, Subscription, UserId};
use crate::db::{RatingRepository, SubscriptionRepository};

/// Two aligned vectors over the same index set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairedVectors {
    pub first: Vec<f64>,
    pub second: Vec<f64>,
}

impl PairedVectors {
    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }
}

/// Ratings of `a` and `b` by users who rated both.
///
/// Cleared ratings count as "not rated". Ratings of any other channel in
/// `ratings` are ignored.
pub fn ratings_vector(a: ChannelId, b: ChannelId, ratings: &[Rating]) -> PairedVectors {
    let mut by_user: BTreeMap<UserId, [Option<Stars>; 2]> = BTreeMap::new();
    for rating in ratings {
        let side = if rating.channel_id == a {
            0
        } else if rating.channel_id == b {
            1
        } else {
            continue;
        };
        let Some(stars) = rating.stars else {
            continue;
        };
        by_user.entry(rating.user_id).or_default()[side] = Some(stars);
    }

    let mut vectors = PairedVectors::default();
    for pair in by_user.values() {
        if let [Some(first), Some(second)] = pair {
            vectors.first.push(first.as_f64());
            vectors.second.push(second.as_f64());
        }
    }
    vectors
}

/// Presence of each qualifying subscriber IP on `a` and `b` (1.0 or 0.0).
///
/// Only subscriptions newer than `since`, not flagged as noise and from a
/// known address take part. Unlike ratings, an IP present on one side only
/// still contributes.
pub fn subscription_vector(
    a: ChannelId,
    b: ChannelId,
    subscriptions: &[Subscription],
    since: DateTime<Utc>,
) -> PairedVectors {
    let mut by_ip: BTreeMap<&str, [bool; 2]> = BTreeMap::new();
    for subscription in subscriptions {
        if !subscription.counts_for_recommendations(since) {
            continue;
        }
        let side = if subscription.channel_id == a {
            0
        } else if subscription.channel_id == b {
            1
        } else {
            continue;
        };
        by_ip.entry(subscription.ip_address.as_str()).or_default()[side] = true;
    }

    let presence = |seen: bool| if seen { 1.0 } else { 0.0 };
    let mut vectors = PairedVectors::default();
    for [first, second] in by_ip.values() {
        vectors.first.push(presence(*first));
        vectors.second.push(presence(*second));
    }
    vectors
}

/// Load both channels' ratings and build their rating vector.
pub async fn fetch_ratings_vector<R>(repo: &R, a: ChannelId, b: ChannelId) -> Result<PairedVectors>
where
    R: RatingRepository + ?Sized,
{
    let ratings = repo.ratings_for_pair(a, b).await?;
    Ok(ratings_vector(a, b, &ratings))
}

/// Load both channels' recent subscriptions and build their subscription vector.
pub async fn fetch_subscription_vector<R>(
    repo: &R,
    a: ChannelId,
    b: ChannelId,
    since: DateTime<Utc>,
) -> Result<PairedVectors>
where
    R: SubscriptionRepository + ?Sized,
{
    let subscriptions = repo.subscriptions_for_channels(&[a, b], since).await?;
    Ok(subscription_vector(a, b, &subscriptions, since))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rating(user_id: UserId, channel_id: ChannelId, stars: Option<u8>) -> Rating {
        Rating {
            user_id,
            channel_id,
            stars: stars.map(|s| Stars::new(s).unwrap()),
            timestamp: Utc::now(),
        }
    }

    fn sub(channel_id: ChannelId, ip: &str) -> Subscription {
        Subscription {
            channel_id,
            ip_address: ip.to_string(),
            timestamp: Utc::now(),
            ignore_for_recommendations: false,
        }
    }

    #[test]
    fn test_ratings_vector_keeps_only_shared_raters() {
        let ratings = vec![
            rating(2, 1, Some(4)),
            rating(2, 2, Some(5)),
            rating(1, 1, Some(1)),
            rating(1, 2, Some(2)),
            rating(3, 1, Some(3)),
        ];
        let v = ratings_vector(1, 2, &ratings);
        // Ordered by user id: user 1 first
        assert_eq!(v.first, vec![1.0, 4.0]);
        assert_eq!(v.second, vec![2.0, 5.0]);
    }

    #[test]
    fn test_ratings_vector_skips_cleared_ratings() {
        let ratings = vec![rating(1, 1, None), rating(1, 2, Some(3))];
        assert!(ratings_vector(1, 2, &ratings).is_empty());
    }

    #[test]
    fn test_ratings_vector_is_symmetric() {
        let ratings = vec![rating(1, 1, Some(2)), rating(1, 2, Some(5))];
        let ab = ratings_vector(1, 2, &ratings);
        let ba = ratings_vector(2, 1, &ratings);
        assert_eq!(ab.first, ba.second);
        assert_eq!(ab.second, ba.first);
    }

    #[test]
    fn test_subscription_vector_one_sided_presence() {
        let since = Utc::now() - Duration::days(31);
        let subs = vec![sub(1, "1.1.1.1"), sub(1, "2.2.2.2"), sub(2, "2.2.2.2"), sub(2, "3.3.3.3")];
        let v = subscription_vector(1, 2, &subs, since);
        assert_eq!(v.first, vec![1.0, 1.0, 0.0]);
        assert_eq!(v.second, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_subscription_vector_excludes_unknown_ip_and_ignored() {
        let since = Utc::now() - Duration::days(31);
        let mut ignored = sub(2, "4.4.4.4");
        ignored.ignore_for_recommendations = true;
        let mut stale = sub(2, "5.5.5.5");
        stale.timestamp = Utc::now() - Duration::days(40);
        let subs = vec![sub(1, Subscription::UNKNOWN_IP), ignored, stale];
        assert!(subscription_vector(1, 2, &subs, since).is_empty());
    }
}
