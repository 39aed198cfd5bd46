// PgDatabase: PostgreSQL backend implementing the repository traits.
//
// Uses sqlx PgPool for native async queries. All queries use runtime
// parameter binding (not compile-time macros) to avoid requiring
// DATABASE_URL at compile time.
//
// Key differences from SQLite:
// - TIMESTAMPTZ instead of TEXT for timestamps
// - BOOLEAN instead of INTEGER flags
// - `= ANY($1)` with array binds instead of expanded IN lists
// - GENERATED ALWAYS AS IDENTITY for auto-increment

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::pool::Pool;
use sqlx_core::row::Row;
use sqlx_postgres::{PgRow, Postgres};

use super::models::{
    AddedChannel, Channel, ChannelId, ChannelPair, ChannelState, Rating, Similarity, Stars,
    Subscription, TableCounts, UserId,
};
use super::traits::{
    CacheRepository, ChannelRepository, Database, RatingRepository, SimilarityRepository,
    SubscriptionRepository,
};

/// Type alias for the PostgreSQL connection pool.
pub type PgPool = Pool<Postgres>;

pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Connect to PostgreSQL and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to PostgreSQL at {database_url}"))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run all pending migrations.
    ///
    /// Holds a session-level advisory lock on a dedicated connection so two
    /// processes starting together don't race to apply the same migration.
    /// The unlock always runs, even if a migration fails.
    async fn run_migrations(&self) -> Result<()> {
        // ASCII "AFFINITY" as a big-endian i64.
        const MIGRATION_LOCK_KEY: i64 = 0x414646494E495459;

        let mut lock_conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection for migration advisory lock")?;

        sqlx_core::query::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to acquire migration advisory lock")?;

        let migration_result: Result<()> = async {
            sqlx_core::query::query(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
            )
            .execute(&self.pool)
            .await?;

            let migrations = [(
                1,
                include_str!("../../migrations/postgres/0001_initial.sql"),
            )];

            for (version, sql) in migrations {
                let applied: bool = sqlx_core::query::query(
                    "SELECT COUNT(*) > 0 FROM schema_version WHERE version = $1",
                )
                .bind(version)
                .fetch_one(&self.pool)
                .await
                .map(|row| row.get::<bool, _>(0))
                .unwrap_or(false);

                if !applied {
                    // Schema change and schema_version insert commit together
                    let mut tx = self.pool.begin().await?;
                    sqlx_core::raw_sql::raw_sql(sql).execute(&mut *tx).await?;
                    tx.commit().await?;
                }
            }

            Ok(())
        }
        .await;

        let unlock_result = sqlx_core::query::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *lock_conn)
            .await
            .context("Failed to release migration advisory lock");

        // Migration error takes priority over unlock error.
        migration_result?;
        unlock_result?;

        Ok(())
    }

    /// Fill in category sets for already-loaded channels.
    async fn attach_categories(&self, channels: &mut [Channel]) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        let ids: Vec<ChannelId> = channels.iter().map(|c| c.id).collect();
        let rows = sqlx_core::query::query(
            "SELECT channel_id, category FROM channel_categories WHERE channel_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_channel: HashMap<ChannelId, BTreeSet<String>> = HashMap::new();
        for row in rows {
            by_channel
                .entry(row.try_get::<i64, _>(0)?)
                .or_default()
                .insert(row.try_get::<String, _>(1)?);
        }
        for channel in channels.iter_mut() {
            if let Some(categories) = by_channel.remove(&channel.id) {
                channel.categories = categories;
            }
        }
        Ok(())
    }
}

fn channel_from_row(row: &PgRow) -> Result<Channel> {
    let state: String = row.try_get("state")?;
    Ok(Channel {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        state: ChannelState::from_code(&state)?,
        archived: row.try_get("archived")?,
        language: row.try_get("language")?,
        categories: BTreeSet::new(),
    })
}

fn rating_from_row(row: &PgRow) -> Result<Rating> {
    let raw: Option<i32> = row.try_get("rating")?;
    let stars = raw
        .map(|v| u8::try_from(v).context("rating out of range").and_then(Stars::new))
        .transpose()?;
    Ok(Rating {
        user_id: row.try_get("user_id")?,
        channel_id: row.try_get("channel_id")?,
        stars,
        timestamp: row.try_get("timestamp")?,
    })
}

fn subscription_from_row(row: &PgRow) -> Result<Subscription> {
    Ok(Subscription {
        channel_id: row.try_get("channel_id")?,
        ip_address: row.try_get("ip_address")?,
        timestamp: row.try_get("timestamp")?,
        ignore_for_recommendations: row.try_get("ignore_for_recommendations")?,
    })
}

#[async_trait]
impl ChannelRepository for PgDatabase {
    async fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx_core::query::query(
            "INSERT INTO channels (id, name, url, state, archived, language)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT(id) DO UPDATE SET
                name = $2, url = $3, state = $4, archived = $5, language = $6",
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(&channel.url)
        .bind(channel.state.code())
        .bind(channel.archived)
        .bind(&channel.language)
        .execute(&mut *tx)
        .await?;
        sqlx_core::query::query("DELETE FROM channel_categories WHERE channel_id = $1")
            .bind(channel.id)
            .execute(&mut *tx)
            .await?;
        for category in &channel.categories {
            sqlx_core::query::query(
                "INSERT INTO channel_categories (channel_id, category) VALUES ($1, $2)",
            )
            .bind(channel.id)
            .bind(category)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_channel(&self, id: ChannelId) -> Result<Option<Channel>> {
        let mut channels = self.get_channels(&[id]).await?;
        Ok(channels.pop())
    }

    async fn get_channels(&self, ids: &[ChannelId]) -> Result<Vec<Channel>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT id, name, url, state, archived, language FROM channels
             WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        let mut channels = rows
            .iter()
            .map(channel_from_row)
            .collect::<Result<Vec<_>>>()?;
        self.attach_categories(&mut channels).await?;
        Ok(channels)
    }

    async fn approved_channels(&self) -> Result<Vec<Channel>> {
        let rows = sqlx_core::query::query(
            "SELECT id, name, url, state, archived, language FROM channels
             WHERE state IN ($1, $2) ORDER BY id",
        )
        .bind(ChannelState::Approved.code())
        .bind(ChannelState::Audio.code())
        .fetch_all(&self.pool)
        .await?;
        let mut channels = rows
            .iter()
            .map(channel_from_row)
            .collect::<Result<Vec<_>>>()?;
        self.attach_categories(&mut channels).await?;
        Ok(channels)
    }

    async fn add_channel_for_user(&self, added: &AddedChannel) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO added_channels (user_id, channel_id, timestamp)
             VALUES ($1, $2, $3)
             ON CONFLICT(user_id, channel_id) DO UPDATE SET timestamp = $3",
        )
        .bind(added.user_id)
        .bind(added.channel_id)
        .bind(added.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn added_channels(&self, user_id: UserId) -> Result<Vec<AddedChannel>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, channel_id, timestamp FROM added_channels
             WHERE user_id = $1 ORDER BY timestamp DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(AddedChannel {
                    user_id: row.try_get("user_id")?,
                    channel_id: row.try_get("channel_id")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl RatingRepository for PgDatabase {
    async fn upsert_rating(&self, rating: &Rating) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO ratings (user_id, channel_id, rating, timestamp)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT(user_id, channel_id) DO UPDATE SET rating = $3, timestamp = $4",
        )
        .bind(rating.user_id)
        .bind(rating.channel_id)
        .bind(rating.stars.map(|s| i32::from(s.get())))
        .bind(rating.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ratings_for_pair(&self, a: ChannelId, b: ChannelId) -> Result<Vec<Rating>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, channel_id, rating, timestamp FROM ratings
             WHERE channel_id IN ($1, $2) ORDER BY user_id, channel_id",
        )
        .bind(a)
        .bind(b)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rating_from_row).collect()
    }

    async fn ratings_by_user(&self, user_id: UserId) -> Result<Vec<Rating>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, channel_id, rating, timestamp FROM ratings
             WHERE user_id = $1 ORDER BY timestamp DESC, channel_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rating_from_row).collect()
    }

    async fn raters_of(&self, channel_id: ChannelId) -> Result<Vec<UserId>> {
        let rows = sqlx_core::query::query(
            "SELECT DISTINCT user_id FROM ratings WHERE channel_id = $1 ORDER BY user_id",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn channels_rated_by(&self, user_ids: &[UserId]) -> Result<Vec<ChannelId>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT DISTINCT channel_id FROM ratings WHERE user_id = ANY($1) ORDER BY channel_id",
        )
        .bind(user_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn channels_rated_since(&self, since: DateTime<Utc>) -> Result<Vec<ChannelId>> {
        let rows = sqlx_core::query::query(
            "SELECT DISTINCT channel_id FROM ratings WHERE timestamp > $1 ORDER BY channel_id",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>(0)).collect())
    }

    async fn all_ratings(&self) -> Result<Vec<Rating>> {
        let rows = sqlx_core::query::query(
            "SELECT user_id, channel_id, rating, timestamp FROM ratings
             ORDER BY user_id, timestamp, channel_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(rating_from_row).collect()
    }
}

#[async_trait]
impl SubscriptionRepository for PgDatabase {
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO subscriptions (channel_id, ip_address, timestamp, ignore_for_recommendations)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(subscription.channel_id)
        .bind(&subscription.ip_address)
        .bind(subscription.timestamp)
        .bind(subscription.ignore_for_recommendations)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_subscription_since(
        &self,
        ip_address: &str,
        since: DateTime<Utc>,
    ) -> Result<bool> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*) > 0 FROM subscriptions WHERE ip_address = $1 AND timestamp > $2",
        )
        .bind(ip_address)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<bool, _>(0))
    }

    async fn subscriptions_for_channels(
        &self,
        channel_ids: &[ChannelId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT channel_id, ip_address, timestamp, ignore_for_recommendations
             FROM subscriptions
             WHERE timestamp > $1 AND channel_id = ANY($2)
             ORDER BY id",
        )
        .bind(since)
        .bind(channel_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscription_from_row).collect()
    }

    async fn subscriptions_from(
        &self,
        ip_addresses: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        if ip_addresses.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT channel_id, ip_address, timestamp, ignore_for_recommendations
             FROM subscriptions
             WHERE timestamp > $1 AND ip_address = ANY($2)
             ORDER BY id",
        )
        .bind(since)
        .bind(ip_addresses.to_vec())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(subscription_from_row).collect()
    }
}

#[async_trait]
impl SimilarityRepository for PgDatabase {
    async fn get_similarity(&self, pair: ChannelPair) -> Result<Option<f64>> {
        let row = sqlx_core::query::query(
            "SELECT score FROM similarities WHERE channel1_id = $1 AND channel2_id = $2",
        )
        .bind(pair.low())
        .bind(pair.high())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<f64, _>(0)))
    }

    async fn insert_similarity(&self, similarity: &Similarity) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO similarities (channel1_id, channel2_id, score, computed_at)
             VALUES ($1, $2, $3, NOW())",
        )
        .bind(similarity.pair.low())
        .bind(similarity.pair.high())
        .bind(similarity.score)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to store similarity for channels {} and {}",
                similarity.pair.low(),
                similarity.pair.high()
            )
        })?;
        Ok(())
    }

    async fn delete_similarity(&self, pair: ChannelPair) -> Result<u64> {
        let result = sqlx_core::query::query(
            "DELETE FROM similarities WHERE channel1_id = $1 AND channel2_id = $2",
        )
        .bind(pair.low())
        .bind(pair.high())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_similarities(&self) -> Result<u64> {
        let result = sqlx_core::query::query("DELETE FROM similarities")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn similarities_touching(&self, channel_ids: &[ChannelId]) -> Result<Vec<Similarity>> {
        if channel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx_core::query::query(
            "SELECT channel1_id, channel2_id, score FROM similarities
             WHERE channel1_id = ANY($1) OR channel2_id = ANY($1)
             ORDER BY channel1_id, channel2_id",
        )
        .bind(channel_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        let mut similarities = Vec::with_capacity(rows.len());
        for row in rows {
            let low: i64 = row.try_get(0)?;
            let high: i64 = row.try_get(1)?;
            if let Some(pair) = ChannelPair::new(low, high) {
                similarities.push(Similarity {
                    pair,
                    score: row.try_get(2)?,
                });
            }
        }
        Ok(similarities)
    }

    async fn similarity_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query("SELECT COUNT(*)::bigint FROM similarities")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn similarities_updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx_core::query::query("SELECT MAX(computed_at) FROM similarities")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<DateTime<Utc>>, _>(0)?)
    }
}

#[async_trait]
impl CacheRepository for PgDatabase {
    async fn get_cache_entry(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx_core::query::query("SELECT value FROM cache_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    async fn set_cache_entry(&self, key: &str, value: &str) -> Result<()> {
        sqlx_core::query::query(
            "INSERT INTO cache_entries (key, value, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT(key) DO UPDATE SET value = $2, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cache_entries(&self, prefix: &str) -> Result<u64> {
        let result = sqlx_core::query::query("DELETE FROM cache_entries WHERE starts_with(key, $1)")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn table_count(&self) -> Result<i64> {
        let row = sqlx_core::query::query(
            "SELECT COUNT(*)::bigint FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>(0))
    }

    async fn table_counts(&self) -> Result<TableCounts> {
        let row = sqlx_core::query::query(
            "SELECT
                (SELECT COUNT(*)::bigint FROM channels),
                (SELECT COUNT(*)::bigint FROM ratings),
                (SELECT COUNT(*)::bigint FROM subscriptions),
                (SELECT COUNT(*)::bigint FROM added_channels),
                (SELECT COUNT(*)::bigint FROM similarities),
                (SELECT MAX(computed_at) FROM similarities)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(TableCounts {
            channels: row.try_get(0)?,
            ratings: row.try_get(1)?,
            subscriptions: row.try_get(2)?,
            added_channels: row.try_get(3)?,
            similarities: row.try_get(4)?,
            similarities_updated_at: row.try_get::<Option<DateTime<Utc>>, _>(5)?,
        })
    }
}
