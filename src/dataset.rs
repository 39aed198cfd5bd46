// Dataset import: loads channels, ratings, subscriptions and added channels
// from a JSON dump so the engine can run without the channel guide itself.
//
// Subscriptions go through the same throttle as live subscription events:
// one without an explicit timestamp is dropped when the same IP subscribed
// to anything within the last second.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::models::{AddedChannel, Channel, ChannelId, Rating, Subscription};
use crate::db::{Database, SubscriptionRepository};

/// A subscription as it appears in a dump or arrives from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub channel_id: ChannelId,
    pub ip_address: String,
    /// Absent for live events; those are stamped now and throttled.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ignore_for_recommendations: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEvent>,
    #[serde(default)]
    pub added_channels: Vec<AddedChannel>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub channels: usize,
    pub ratings: usize,
    pub subscriptions: usize,
    pub subscriptions_throttled: usize,
    pub added_channels: usize,
}

impl Dataset {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse dataset {}", path.display()))
    }
}

/// How long an IP must wait between two untimed subscriptions.
pub fn throttle_window() -> Duration {
    Duration::seconds(1)
}

/// Record one subscription event. Returns false when it was throttled.
pub async fn record_subscription<S>(repo: &S, event: &SubscriptionEvent) -> Result<bool>
where
    S: SubscriptionRepository + ?Sized,
{
    let timestamp = match event.timestamp {
        Some(ts) => ts,
        None => {
            let now = Utc::now();
            if repo
                .has_subscription_since(&event.ip_address, now - throttle_window())
                .await?
            {
                debug!(ip = %event.ip_address, "Throttled subscription");
                return Ok(false);
            }
            now
        }
    };
    repo.insert_subscription(&Subscription {
        channel_id: event.channel_id,
        ip_address: event.ip_address.clone(),
        timestamp,
        ignore_for_recommendations: event.ignore_for_recommendations,
    })
    .await?;
    Ok(true)
}

/// Write a dataset into the database. Channels, ratings and added channels
/// are upserted; subscriptions are appended.
pub async fn import_dataset(db: &dyn Database, dataset: &Dataset) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for channel in &dataset.channels {
        db.upsert_channel(channel)
            .await
            .with_context(|| format!("Failed to import channel {}", channel.id))?;
        summary.channels += 1;
    }
    for rating in &dataset.ratings {
        db.upsert_rating(rating).await.with_context(|| {
            format!(
                "Failed to import rating of channel {} by user {}",
                rating.channel_id, rating.user_id
            )
        })?;
        summary.ratings += 1;
    }
    for event in &dataset.subscriptions {
        if record_subscription(db, event).await? {
            summary.subscriptions += 1;
        } else {
            summary.subscriptions_throttled += 1;
        }
    }
    for added in &dataset.added_channels {
        db.add_channel_for_user(added).await?;
        summary.added_channels += 1;
    }

    info!(
        channels = summary.channels,
        ratings = summary.ratings,
        subscriptions = summary.subscriptions,
        added = summary.added_channels,
        "Dataset imported"
    );
    Ok(summary)
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    fn event(ip: &str, timestamp: Option<DateTime<Utc>>) -> SubscriptionEvent {
        SubscriptionEvent {
            channel_id: 1,
            ip_address: ip.to_string(),
            timestamp,
            ignore_for_recommendations: false,
        }
    }

    #[tokio::test]
    async fn test_untimed_subscription_throttled() {
        let db = crate::db::open_in_memory().unwrap();
        assert!(record_subscription(db.as_ref(), &event("1.2.3.4", None)).await.unwrap());
        assert!(!record_subscription(db.as_ref(), &event("1.2.3.4", None)).await.unwrap());
        // A different address is not affected
        assert!(record_subscription(db.as_ref(), &event("5.6.7.8", None)).await.unwrap());
    }

    #[tokio::test]
    async fn test_timed_subscription_never_throttled() {
        let db = crate::db::open_in_memory().unwrap();
        let now = Utc::now();
        assert!(record_subscription(db.as_ref(), &event("1.2.3.4", Some(now))).await.unwrap());
        assert!(record_subscription(db.as_ref(), &event("1.2.3.4", Some(now))).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_dataset_from_json() {
        let json = r#"{
            "channels": [
                {"id": 1, "name": "One", "state": "A", "language": "en", "categories": ["news"]},
                {"id": 2, "name": "Two", "url": "http://example.com/feed"}
            ],
            "ratings": [{"user_id": 9, "channel_id": 1, "stars": 4}],
            "subscriptions": [{"channel_id": 2, "ip_address": "1.1.1.1"}],
            "added_channels": [{"user_id": 9, "channel_id": 2}]
        }"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        let db = crate::db::open_in_memory().unwrap();
        let summary = import_dataset(db.as_ref(), &dataset).await.unwrap();
        assert_eq!(summary.channels, 2);
        assert_eq!(summary.ratings, 1);
        assert_eq!(summary.subscriptions, 1);
        assert_eq!(summary.added_channels, 1);

        let counts = db.table_counts().await.unwrap();
        assert_eq!(counts.channels, 2);
        assert_eq!(counts.added_channels, 1);
    }

    #[test]
    fn test_dataset_rejects_bad_rating() {
        let json = r#"{"ratings": [{"user_id": 1, "channel_id": 1, "stars": 9}]}"#;
        assert!(serde_json::from_str::<Dataset>(json).is_err());
    }
}
