// Repository traits: backend-agnostic async interfaces for all DB operations.
//
// Implementors: SqliteDatabase (wraps rusqlite), PgDatabase (wraps sqlx).
// All methods are async so both sync (rusqlite via Mutex) and native async
// (sqlx) backends fit behind a single interface.
//
// The engine modules only name the narrow repository they need
// (e.g. `R: RatingRepository + ?Sized`), so `&dyn Database` satisfies any of
// them and tests can pass whichever backend they like.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    AddedChannel, Channel, ChannelId, ChannelPair, Rating, Similarity, Subscription, TableCounts,
    UserId,
};

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Insert or replace a channel together with its categories.
    async fn upsert_channel(&self, channel: &Channel) -> Result<()>;

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>>;

    /// Fetch every channel whose id is in `ids`. Unknown ids are skipped.
    async fn get_channels(&self, ids: &[ChannelId]) -> Result<Vec<Channel>>;

    /// All channels in an approved state (approved or audio), ordered by id.
    async fn approved_channels(&self) -> Result<Vec<Channel>>;

    /// Record that a user added a channel (upsert on (user, channel)).
    async fn add_channel_for_user(&self, added: &AddedChannel) -> Result<()>;

    /// A user's added channels, newest first.
    async fn added_channels(&self, user_id: UserId) -> Result<Vec<AddedChannel>>;
}

#[async_trait]
pub trait RatingRepository: Send + Sync {
    /// Save or update a user's rating of a channel.
    async fn upsert_rating(&self, rating: &Rating) -> Result<()>;

    /// Every rating (cleared ones included) of either channel.
    async fn ratings_for_pair(&self, a: ChannelId, b: ChannelId) -> Result<Vec<Rating>>;

    /// All of a user's ratings, newest first.
    async fn ratings_by_user(&self, user_id: UserId) -> Result<Vec<Rating>>;

    /// Distinct users with any rating (cleared ones included) of the channel.
    async fn raters_of(&self, channel_id: ChannelId) -> Result<Vec<UserId>>;

    /// Distinct channels rated by any of the given users.
    async fn channels_rated_by(&self, user_ids: &[UserId]) -> Result<Vec<ChannelId>>;

    /// Distinct channels with a rating newer than `since`.
    async fn channels_rated_since(&self, since: DateTime<Utc>) -> Result<Vec<ChannelId>>;

    /// Every rating in the database, ordered by (user, timestamp).
    async fn all_ratings(&self) -> Result<Vec<Rating>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Append a subscription event.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Whether `ip_address` subscribed to anything after `since`.
    async fn has_subscription_since(&self, ip_address: &str, since: DateTime<Utc>)
        -> Result<bool>;

    /// Subscriptions to any of `channel_ids` newer than `since`.
    async fn subscriptions_for_channels(
        &self,
        channel_ids: &[ChannelId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>>;

    /// Subscriptions from any of `ip_addresses` newer than `since`.
    async fn subscriptions_from(
        &self,
        ip_addresses: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait SimilarityRepository: Send + Sync {
    async fn get_similarity(&self, pair: ChannelPair) -> Result<Option<f64>>;

    /// Insert a row for a pair that has none. Fails if the pair already exists.
    async fn insert_similarity(&self, similarity: &Similarity) -> Result<()>;

    /// Delete the row for a pair. Returns the number of rows removed.
    async fn delete_similarity(&self, pair: ChannelPair) -> Result<u64>;

    /// Delete every row. Returns the number of rows removed.
    async fn delete_all_similarities(&self) -> Result<u64>;

    /// Rows where either side is one of `channel_ids`.
    async fn similarities_touching(&self, channel_ids: &[ChannelId]) -> Result<Vec<Similarity>>;

    async fn similarity_count(&self) -> Result<i64>;

    /// When the newest row was written, `None` for an empty table.
    async fn similarities_updated_at(&self) -> Result<Option<DateTime<Utc>>>;
}

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn get_cache_entry(&self, key: &str) -> Result<Option<String>>;

    /// Set a cache entry (upsert).
    async fn set_cache_entry(&self, key: &str, value: &str) -> Result<()>;

    /// Delete every entry whose key starts with `prefix`. Returns the number removed.
    async fn delete_cache_entries(&self, prefix: &str) -> Result<u64>;
}

/// The full storage surface: every repository plus lifecycle queries.
#[async_trait]
pub trait Database:
    ChannelRepository + RatingRepository + SubscriptionRepository + SimilarityRepository + CacheRepository
{
    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    /// Row counts for the status display.
    async fn table_counts(&self) -> Result<TableCounts>;
}
