// Candidate relevance: which channels are worth comparing with a given one.
//
// Comparing every channel with every other is quadratic, so a pair is only
// computed when the two channels share an audience: a common rater, or
// (optionally) a common subscriber IP.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::models::{ChannelId, Subscription};
use crate::db::{ChannelRepository, RatingRepository, SubscriptionRepository};

/// Channels rated by anyone who rated `channel_id`, excluding the channel itself.
///
/// Empty when the channel has no ratings at all.
pub async fn find_relevant_similar_rating<R>(
    repo: &R,
    channel_id: ChannelId,
) -> Result<BTreeSet<ChannelId>>
where
    R: RatingRepository + ?Sized,
{
    let raters = repo.raters_of(channel_id).await?;
    if raters.is_empty() {
        return Ok(BTreeSet::new());
    }
    let mut channels: BTreeSet<ChannelId> =
        repo.channels_rated_by(&raters).await?.into_iter().collect();
    channels.remove(&channel_id);
    Ok(channels)
}

/// Approved channels other than `channel_id` that share qualifying subscribers.
///
/// With `ip_address`, only that subscriber's channels are returned; without
/// it, every subscriber of `channel_id` since `since` is considered.
pub async fn find_relevant_similar_subscription<D>(
    db: &D,
    channel_id: ChannelId,
    ip_address: Option<&str>,
    since: DateTime<Utc>,
) -> Result<BTreeSet<ChannelId>>
where
    D: ChannelRepository + SubscriptionRepository + ?Sized,
{
    let subscribers: Vec<String> = match ip_address {
        Some(ip) => vec![ip.to_string()],
        None => {
            let own = db.subscriptions_for_channels(&[channel_id], since).await?;
            let ips: BTreeSet<String> = own
                .into_iter()
                .filter(|s| s.counts_for_recommendations(since))
                .map(|s| s.ip_address)
                .collect();
            ips.into_iter().collect()
        }
    };
    if subscribers.is_empty() {
        return Ok(BTreeSet::new());
    }

    let candidates: BTreeSet<ChannelId> = db
        .subscriptions_from(&subscribers, since)
        .await?
        .iter()
        .filter(|s| s.counts_for_recommendations(since) && s.channel_id != channel_id)
        .map(|s: &Subscription| s.channel_id)
        .collect();
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let ids: Vec<ChannelId> = candidates.into_iter().collect();
    Ok(db
        .get_channels(&ids)
        .await?
        .into_iter()
        .filter(|c| c.state.is_approved())
        .map(|c| c.id)
        .collect())
}

/// Every channel worth comparing with `channel_id`.
///
/// Always the rating-based set; the subscription-based set is added when
/// `include_subscriptions` is on.
pub async fn find_relevant_similar<D>(
    db: &D,
    channel_id: ChannelId,
    include_subscriptions: bool,
    subscription_since: DateTime<Utc>,
) -> Result<BTreeSet<ChannelId>>
where
    D: ChannelRepository + RatingRepository + SubscriptionRepository + ?Sized,
{
    let mut relevant = find_relevant_similar_rating(db, channel_id).await?;
    if include_subscriptions {
        relevant.extend(
            find_relevant_similar_subscription(db, channel_id, None, subscription_since).await?,
        );
    }
    Ok(relevant)
}
