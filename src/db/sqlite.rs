// SqliteDatabase: rusqlite backend implementing the repository traits.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.
//
// The free functions in queries.rs stay usable on a bare Connection, which is
// what their own unit tests exercise.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{
    AddedChannel, Channel, ChannelId, ChannelPair, Rating, Similarity, Subscription, TableCounts,
    UserId,
};
use super::queries;
use super::traits::{
    CacheRepository, ChannelRepository, Database, RatingRepository, SimilarityRepository,
    SubscriptionRepository,
};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl ChannelRepository for SqliteDatabase {
    async fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_channel(&conn, channel)
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let conn = self.conn.lock().await;
        queries::get_channel(&conn, id)
    }

    async fn get_channels(&self, ids: &[ChannelId]) -> Result<Vec<Channel>> {
        let conn = self.conn.lock().await;
        queries::get_channels(&conn, ids)
    }

    async fn approved_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.conn.lock().await;
        queries::approved_channels(&conn)
    }

    async fn add_channel_for_user(&self, added: &AddedChannel) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::add_channel_for_user(&conn, added)
    }

    async fn added_channels(&self, user_id: UserId) -> Result<Vec<AddedChannel>> {
        let conn = self.conn.lock().await;
        queries::added_channels(&conn, user_id)
    }
}

#[async_trait]
impl RatingRepository for SqliteDatabase {
    async fn upsert_rating(&self, rating: &Rating) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::upsert_rating(&conn, rating)
    }

    async fn ratings_for_pair(&self, a: ChannelId, b: ChannelId) -> Result<Vec<Rating>> {
        let conn = self.conn.lock().await;
        queries::ratings_for_pair(&conn, a, b)
    }

    async fn ratings_by_user(&self, user_id: UserId) -> Result<Vec<Rating>> {
        let conn = self.conn.lock().await;
        queries::ratings_by_user(&conn, user_id)
    }

    async fn raters_of(&self, channel_id: ChannelId) -> Result<Vec<UserId>> {
        let conn = self.conn.lock().await;
        queries::raters_of(&conn, channel_id)
    }

    async fn channels_rated_by(&self, user_ids: &[UserId]) -> Result<Vec<ChannelId>> {
        let conn = self.conn.lock().await;
        queries::channels_rated_by(&conn, user_ids)
    }

    async fn channels_rated_since(&self, since: DateTime<Utc>) -> Result<Vec<ChannelId>> {
        let conn = self.conn.lock().await;
        queries::channels_rated_since(&conn, &since)
    }

    async fn all_ratings(&self) -> Result<Vec<Rating>> {
        let conn = self.conn.lock().await;
        queries::all_ratings(&conn)
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteDatabase {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_subscription(&conn, subscription)
    }

    async fn has_subscription_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        queries::has_subscription_since(&conn, ip_address, &since)
    }

    async fn subscriptions_for_channels(
        &self,
        channel_ids: &[ChannelId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().await;
        queries::subscriptions_for_channels(&conn, channel_ids, &since)
    }

    async fn subscriptions_from(
        &self,
        ip_addresses: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().await;
        queries::subscriptions_from(&conn, ip_addresses, &since)
    }
}

#[async_trait]
impl SimilarityRepository for SqliteDatabase {
    async fn get_similarity(&self, pair: ChannelPair) -> Result<Option<f64>> {
        let conn = self.conn.lock().await;
        queries::get_similarity(&conn, pair)
    }

    async fn insert_similarity(&self, similarity: &Similarity) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::insert_similarity(&conn, similarity)
    }

    async fn delete_similarity(&self, pair: ChannelPair) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::delete_similarity(&conn, pair)
    }

    async fn delete_all_similarities(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::delete_all_similarities(&conn)
    }

    async fn similarities_touching(&self, channel_ids: &[ChannelId]) -> Result<Vec<Similarity>> {
        let conn = self.conn.lock().await;
        queries::similarities_touching(&conn, channel_ids)
    }

    async fn similarity_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        queries::similarity_count(&conn)
    }

    async fn similarities_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().await;
        queries::similarities_updated_at(&conn)
    }
}

#[async_trait]
impl CacheRepository for SqliteDatabase {
    async fn get_cache_entry(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        queries::get_cache_entry(&conn, key)
    }

    async fn set_cache_entry(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        queries::set_cache_entry(&conn, key, value)
    }

    async fn delete_cache_entries(&self, prefix: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        queries::delete_cache_entries(&conn, prefix)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let conn = self.conn.lock().await;
        queries::table_counts(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ChannelState, Stars};
    use crate::db::schema::create_tables;

    async fn test_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    #[tokio::test]
    async fn test_trait_cache_entry_roundtrip() {
        let db = test_db().await;
        assert_eq!(db.get_cache_entry("key").await.unwrap(), None);
        db.set_cache_entry("key", "abc123").await.unwrap();
        db.set_cache_entry("key", "def456").await.unwrap();
        assert_eq!(
            db.get_cache_entry("key").await.unwrap(),
            Some("def456".to_string())
        );
    }

    #[tokio::test]
    async fn test_trait_channel_roundtrip() {
        let db = test_db().await;
        let channel = Channel {
            id: 42,
            name: "Science Hour".to_string(),
            url: None,
            state: ChannelState::Audio,
            archived: true,
            language: Some("de".to_string()),
            categories: ["science".to_string()].into_iter().collect(),
        };
        db.upsert_channel(&channel).await.unwrap();
        assert_eq!(db.get_channel(42).await.unwrap(), Some(channel));
        assert!(db.get_channel(43).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trait_co_raters() {
        let db = test_db().await;
        for (user_id, channel_id) in [(1, 10), (1, 11), (2, 10), (2, 12), (3, 13)] {
            db.upsert_rating(&Rating {
                user_id,
                channel_id,
                stars: Some(Stars::new(3).unwrap()),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        }
        let raters = db.raters_of(10).await.unwrap();
        assert_eq!(raters, vec![1, 2]);
        let channels = db.channels_rated_by(&raters).await.unwrap();
        assert_eq!(channels, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn test_trait_similarity_delete() {
        let db = test_db().await;
        let pair = ChannelPair::new(3, 1).unwrap();
        db.insert_similarity(&Similarity { pair, score: 0.25 })
            .await
            .unwrap();
        assert_eq!(db.get_similarity(pair).await.unwrap(), Some(0.25));
        assert_eq!(db.delete_similarity(pair).await.unwrap(), 1);
        assert_eq!(db.delete_similarity(pair).await.unwrap(), 0);
        assert_eq!(db.similarity_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db().await;
        assert_eq!(db.table_count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_trait_added_channels_newest_first() {
        let db = test_db().await;
        let now = Utc::now();
        for (channel_id, age) in [(1, 10), (2, 1)] {
            db.add_channel_for_user(&AddedChannel {
                user_id: 5,
                channel_id,
                timestamp: now - chrono::Duration::minutes(age),
            })
            .await
            .unwrap();
        }
        let added = db.added_channels(5).await.unwrap();
        assert_eq!(added[0].channel_id, 2);
        assert_eq!(added.len(), 2);
    }
}
