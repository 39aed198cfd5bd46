// Database queries: CRUD operations for all tables.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.
//
// Timestamps are stored as fixed-width UTC text ("YYYY-MM-DD HH:MM:SS.ffffff")
// so string comparison in SQL matches chronological order.

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::models::{
    AddedChannel, Channel, ChannelId, ChannelPair, ChannelState, Rating, Similarity, Stars,
    Subscription, TableCounts, UserId,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a timestamp for storage.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp. Accepts SQLite's `datetime('now')` output too.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .with_context(|| format!("Invalid timestamp in database: {text:?}"))?;
    Ok(naive.and_utc())
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn stars_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Stars>> {
    let raw: Option<u8> = row.get(idx)?;
    raw.map(Stars::new)
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, e.into()))
}

/// "?,?,?" with one placeholder per element.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

// --- Channels ---

/// Insert or replace a channel and its category set.
pub fn upsert_channel(conn: &Connection, channel: &Channel) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO channels (id, name, url, state, archived, language)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
            name = ?2,
            url = ?3,
            state = ?4,
            archived = ?5,
            language = ?6",
        params![
            channel.id,
            channel.name,
            channel.url,
            channel.state.code(),
            channel.archived,
            channel.language,
        ],
    )?;
    tx.execute(
        "DELETE FROM channel_categories WHERE channel_id = ?1",
        params![channel.id],
    )?;
    for category in &channel.categories {
        tx.execute(
            "INSERT INTO channel_categories (channel_id, category) VALUES (?1, ?2)",
            params![channel.id, category],
        )?;
    }
    tx.commit()?;
    Ok(())
}

const CHANNEL_COLUMNS: &str = "id, name, url, state, archived, language";

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let state_code: String = row.get(3)?;
    let state = ChannelState::from_code(&state_code)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?;
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        state,
        archived: row.get(4)?,
        language: row.get(5)?,
        categories: BTreeSet::new(),
    })
}

/// Fill in the category sets of already-loaded channels.
fn attach_categories(conn: &Connection, channels: &mut [Channel]) -> Result<()> {
    if channels.is_empty() {
        return Ok(());
    }
    let ids: Vec<ChannelId> = channels.iter().map(|c| c.id).collect();
    let sql = format!(
        "SELECT channel_id, category FROM channel_categories WHERE channel_id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, ChannelId>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut by_channel: HashMap<ChannelId, BTreeSet<String>> = HashMap::new();
    for row in rows {
        let (channel_id, category) = row?;
        by_channel.entry(channel_id).or_default().insert(category);
    }
    for channel in channels.iter_mut() {
        if let Some(categories) = by_channel.remove(&channel.id) {
            channel.categories = categories;
        }
    }
    Ok(())
}

pub fn get_channel(conn: &Connection, id: ChannelId) -> Result<Option<Channel>> {
    let mut channels = get_channels(conn, &[id])?;
    Ok(channels.pop())
}

/// Fetch channels by id, ordered by id. Unknown ids are skipped.
pub fn get_channels(conn: &Connection, ids: &[ChannelId]) -> Result<Vec<Channel>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {CHANNEL_COLUMNS} FROM channels WHERE id IN ({}) ORDER BY id",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut channels = stmt
        .query_map(params_from_iter(ids.iter()), channel_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_categories(conn, &mut channels)?;
    Ok(channels)
}

/// All channels in an approved state (approved or audio), ordered by id.
pub fn approved_channels(conn: &Connection) -> Result<Vec<Channel>> {
    let sql = format!(
        "SELECT {CHANNEL_COLUMNS} FROM channels
         WHERE state IN (?1, ?2)
         ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut channels = stmt
        .query_map(
            params![ChannelState::Approved.code(), ChannelState::Audio.code()],
            channel_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    attach_categories(conn, &mut channels)?;
    Ok(channels)
}

// --- Added channels ---

pub fn add_channel_for_user(conn: &Connection, added: &AddedChannel) -> Result<()> {
    conn.execute(
        "INSERT INTO added_channels (user_id, channel_id, timestamp)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, channel_id) DO UPDATE SET timestamp = ?3",
        params![
            added.user_id,
            added.channel_id,
            format_timestamp(&added.timestamp)
        ],
    )?;
    Ok(())
}

/// A user's added channels, newest first.
pub fn added_channels(conn: &Connection, user_id: UserId) -> Result<Vec<AddedChannel>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, channel_id, timestamp FROM added_channels
         WHERE user_id = ?1
         ORDER BY timestamp DESC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(AddedChannel {
                user_id: row.get(0)?,
                channel_id: row.get(1)?,
                timestamp: timestamp_column(row, 2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// --- Ratings ---

/// Save or update a user's rating. A rating is unique per (user, channel).
pub fn upsert_rating(conn: &Connection, rating: &Rating) -> Result<()> {
    conn.execute(
        "INSERT INTO ratings (user_id, channel_id, rating, timestamp)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, channel_id) DO UPDATE SET rating = ?3, timestamp = ?4",
        params![
            rating.user_id,
            rating.channel_id,
            rating.stars.map(Stars::get),
            format_timestamp(&rating.timestamp),
        ],
    )?;
    Ok(())
}

const RATING_COLUMNS: &str = "user_id, channel_id, rating, timestamp";

fn rating_from_row(row: &Row<'_>) -> rusqlite::Result<Rating> {
    Ok(Rating {
        user_id: row.get(0)?,
        channel_id: row.get(1)?,
        stars: stars_column(row, 2)?,
        timestamp: timestamp_column(row, 3)?,
    })
}

/// Every rating of either channel, ordered by user.
pub fn ratings_for_pair(conn: &Connection, a: ChannelId, b: ChannelId) -> Result<Vec<Rating>> {
    let sql = format!(
        "SELECT {RATING_COLUMNS} FROM ratings
         WHERE channel_id IN (?1, ?2)
         ORDER BY user_id, channel_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![a, b], rating_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All of a user's ratings, newest first.
pub fn ratings_by_user(conn: &Connection, user_id: UserId) -> Result<Vec<Rating>> {
    let sql = format!(
        "SELECT {RATING_COLUMNS} FROM ratings
         WHERE user_id = ?1
         ORDER BY timestamp DESC, channel_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id], rating_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn raters_of(conn: &Connection, channel_id: ChannelId) -> Result<Vec<UserId>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT user_id FROM ratings WHERE channel_id = ?1 ORDER BY user_id")?;
    let rows = stmt
        .query_map(params![channel_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn channels_rated_by(conn: &Connection, user_ids: &[UserId]) -> Result<Vec<ChannelId>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT DISTINCT channel_id FROM ratings WHERE user_id IN ({}) ORDER BY channel_id",
        placeholders(user_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(user_ids.iter()), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn channels_rated_since(conn: &Connection, since: &DateTime<Utc>) -> Result<Vec<ChannelId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT channel_id FROM ratings WHERE timestamp > ?1 ORDER BY channel_id",
    )?;
    let rows = stmt
        .query_map(params![format_timestamp(since)], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn all_ratings(conn: &Connection) -> Result<Vec<Rating>> {
    let sql = format!("SELECT {RATING_COLUMNS} FROM ratings ORDER BY user_id, timestamp, channel_id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], rating_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// --- Subscriptions ---

pub fn insert_subscription(conn: &Connection, subscription: &Subscription) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions (channel_id, ip_address, timestamp, ignore_for_recommendations)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            subscription.channel_id,
            subscription.ip_address,
            format_timestamp(&subscription.timestamp),
            subscription.ignore_for_recommendations,
        ],
    )?;
    Ok(())
}

pub fn has_subscription_since(
    conn: &Connection,
    ip_address: &str,
    since: &DateTime<Utc>,
) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM subscriptions WHERE ip_address = ?1 AND timestamp > ?2",
        params![ip_address, format_timestamp(since)],
        |row| row.get(0),
    )?;
    Ok(found)
}

const SUBSCRIPTION_COLUMNS: &str = "channel_id, ip_address, timestamp, ignore_for_recommendations";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        channel_id: row.get(0)?,
        ip_address: row.get(1)?,
        timestamp: timestamp_column(row, 2)?,
        ignore_for_recommendations: row.get(3)?,
    })
}

pub fn subscriptions_for_channels(
    conn: &Connection,
    channel_ids: &[ChannelId],
    since: &DateTime<Utc>,
) -> Result<Vec<Subscription>> {
    if channel_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
         WHERE timestamp > ? AND channel_id IN ({})
         ORDER BY id",
        placeholders(channel_ids.len())
    );
    let since = format_timestamp(since);
    let mut values: Vec<&dyn rusqlite::ToSql> = vec![&since];
    values.extend(channel_ids.iter().map(|id| id as &dyn rusqlite::ToSql));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(values.as_slice(), subscription_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn subscriptions_from(
    conn: &Connection,
    ip_addresses: &[String],
    since: &DateTime<Utc>,
) -> Result<Vec<Subscription>> {
    if ip_addresses.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
         WHERE timestamp > ? AND ip_address IN ({})
         ORDER BY id",
        placeholders(ip_addresses.len())
    );
    let since = format_timestamp(since);
    let mut values: Vec<&dyn rusqlite::ToSql> = vec![&since];
    values.extend(ip_addresses.iter().map(|ip| ip as &dyn rusqlite::ToSql));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(values.as_slice(), subscription_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// --- Similarities ---

pub fn get_similarity(conn: &Connection, pair: ChannelPair) -> Result<Option<f64>> {
    let mut stmt = conn
        .prepare("SELECT score FROM similarities WHERE channel1_id = ?1 AND channel2_id = ?2")?;
    let result = stmt
        .query_row(params![pair.low(), pair.high()], |row| row.get(0))
        .optional()?;
    Ok(result)
}

pub fn insert_similarity(conn: &Connection, similarity: &Similarity) -> Result<()> {
    conn.execute(
        "INSERT INTO similarities (channel1_id, channel2_id, score, computed_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            similarity.pair.low(),
            similarity.pair.high(),
            similarity.score,
            format_timestamp(&Utc::now()),
        ],
    )
    .with_context(|| {
        format!(
            "Failed to store similarity for channels {} and {}",
            similarity.pair.low(),
            similarity.pair.high()
        )
    })?;
    Ok(())
}

pub fn delete_similarity(conn: &Connection, pair: ChannelPair) -> Result<u64> {
    let deleted = conn.execute(
        "DELETE FROM similarities WHERE channel1_id = ?1 AND channel2_id = ?2",
        params![pair.low(), pair.high()],
    )?;
    Ok(deleted as u64)
}

pub fn delete_all_similarities(conn: &Connection) -> Result<u64> {
    let deleted = conn.execute("DELETE FROM similarities", [])?;
    Ok(deleted as u64)
}

pub fn similarities_touching(
    conn: &Connection,
    channel_ids: &[ChannelId],
) -> Result<Vec<Similarity>> {
    if channel_ids.is_empty() {
        return Ok(Vec::new());
    }
    let list = placeholders(channel_ids.len());
    let sql = format!(
        "SELECT channel1_id, channel2_id, score FROM similarities
         WHERE channel1_id IN ({list}) OR channel2_id IN ({list})
         ORDER BY channel1_id, channel2_id"
    );
    let values: Vec<&ChannelId> = channel_ids.iter().chain(channel_ids.iter()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, ChannelId>(0)?,
            row.get::<_, ChannelId>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    let mut similarities = Vec::new();
    for row in rows {
        let (low, high, score) = row?;
        // The CHECK constraint guarantees low < high
        if let Some(pair) = ChannelPair::new(low, high) {
            similarities.push(Similarity { pair, score });
        }
    }
    Ok(similarities)
}

pub fn similarity_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM similarities", [], |row| row.get(0))?;
    Ok(count)
}

/// When the newest similarity row was written.
pub fn similarities_updated_at(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let updated_at: Option<String> =
        conn.query_row("SELECT MAX(computed_at) FROM similarities", [], |row| {
            row.get(0)
        })?;
    updated_at.as_deref().map(parse_timestamp).transpose()
}

// --- Cache entries ---

pub fn get_cache_entry(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM cache_entries WHERE key = ?1")?;
    let result = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(result)
}

pub fn set_cache_entry(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO cache_entries (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

/// Delete the entries whose key starts with `prefix` (matched literally, not as a LIKE pattern).
pub fn delete_cache_entries(conn: &Connection, prefix: &str) -> Result<u64> {
    let deleted = conn.execute(
        "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
        params![prefix],
    )?;
    Ok(deleted as u64)
}

// --- Status ---

pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let count = |table: &str| -> Result<i64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n)
    };

    Ok(TableCounts {
        channels: count("channels")?,
        ratings: count("ratings")?,
        subscriptions: count("subscriptions")?,
        added_channels: count("added_channels")?,
        similarities: count("similarities")?,
        similarities_updated_at: similarities_updated_at(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;
    use chrono::Duration;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn channel(id: ChannelId, categories: &[&str]) -> Channel {
        Channel {
            id,
            name: format!("Channel {id}"),
            url: Some(format!("http://example.com/{id}.rss")),
            state: ChannelState::Approved,
            archived: false,
            language: Some("en".to_string()),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_timestamp_round_trip_preserves_order() {
        let earlier = Utc::now();
        let later = earlier + Duration::milliseconds(5);
        let (a, b) = (format_timestamp(&earlier), format_timestamp(&later));
        assert!(a < b);
        // Stored with microsecond precision
        let drift = parse_timestamp(&a).unwrap() - earlier;
        assert!(drift.num_nanoseconds().unwrap().abs() < 1_000);
    }

    #[test]
    fn test_parse_sqlite_default_timestamp() {
        assert!(parse_timestamp("2024-03-01 12:30:00").is_ok());
    }

    #[test]
    fn test_channel_upsert_replaces_categories() {
        let conn = test_conn();
        upsert_channel(&conn, &channel(1, &["news", "tech"])).unwrap();
        upsert_channel(&conn, &channel(1, &["comedy"])).unwrap();

        let loaded = get_channel(&conn, 1).unwrap().unwrap();
        assert_eq!(loaded.categories.len(), 1);
        assert!(loaded.categories.contains("comedy"));
    }

    #[test]
    fn test_approved_channels_excludes_unreviewed() {
        let conn = test_conn();
        upsert_channel(&conn, &channel(1, &[])).unwrap();
        let mut audio = channel(2, &[]);
        audio.state = ChannelState::Audio;
        upsert_channel(&conn, &audio).unwrap();
        let mut fresh = channel(3, &[]);
        fresh.state = ChannelState::New;
        upsert_channel(&conn, &fresh).unwrap();

        let ids: Vec<ChannelId> = approved_channels(&conn)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_rating_upsert_keeps_one_row_per_user_channel() {
        let conn = test_conn();
        let mut rating = Rating {
            user_id: 7,
            channel_id: 1,
            stars: Some(Stars::new(2).unwrap()),
            timestamp: Utc::now(),
        };
        upsert_rating(&conn, &rating).unwrap();
        rating.stars = None;
        upsert_rating(&conn, &rating).unwrap();

        let ratings = ratings_by_user(&conn, 7).unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].stars, None);
    }

    #[test]
    fn test_channels_rated_since() {
        let conn = test_conn();
        let now = Utc::now();
        for (channel_id, age_hours) in [(1, 2), (2, 48)] {
            upsert_rating(
                &conn,
                &Rating {
                    user_id: 1,
                    channel_id,
                    stars: Some(Stars::new(4).unwrap()),
                    timestamp: now - Duration::hours(age_hours),
                },
            )
            .unwrap();
        }
        let recent = channels_rated_since(&conn, &(now - Duration::hours(24))).unwrap();
        assert_eq!(recent, vec![1]);
    }

    #[test]
    fn test_subscriptions_respect_window() {
        let conn = test_conn();
        let now = Utc::now();
        for (channel_id, age_days) in [(1, 1), (1, 40), (2, 1)] {
            insert_subscription(
                &conn,
                &Subscription {
                    channel_id,
                    ip_address: "1.1.1.1".to_string(),
                    timestamp: now - Duration::days(age_days),
                    ignore_for_recommendations: false,
                },
            )
            .unwrap();
        }
        let since = now - Duration::days(31);
        assert_eq!(subscriptions_for_channels(&conn, &[1], &since).unwrap().len(), 1);
        assert_eq!(
            subscriptions_from(&conn, &["1.1.1.1".to_string()], &since)
                .unwrap()
                .len(),
            2
        );
        assert!(subscriptions_for_channels(&conn, &[], &since).unwrap().is_empty());
    }

    #[test]
    fn test_similarities_touching_either_side() {
        let conn = test_conn();
        for (a, b, score) in [(1, 2, 0.5), (2, 3, 0.1), (4, 5, 0.9)] {
            insert_similarity(
                &conn,
                &Similarity {
                    pair: ChannelPair::new(a, b).unwrap(),
                    score,
                },
            )
            .unwrap();
        }
        let rows = similarities_touching(&conn, &[2]).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = similarities_touching(&conn, &[5]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pair.low(), 4);
    }

    #[test]
    fn test_duplicate_similarity_insert_fails() {
        let conn = test_conn();
        let similarity = Similarity {
            pair: ChannelPair::new(1, 2).unwrap(),
            score: 0.3,
        };
        insert_similarity(&conn, &similarity).unwrap();
        assert!(insert_similarity(&conn, &similarity).is_err());
        assert_eq!(similarity_count(&conn).unwrap(), 1);
    }

    #[test]
    fn test_table_counts() {
        let conn = test_conn();
        upsert_channel(&conn, &channel(1, &[])).unwrap();
        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.channels, 1);
        assert_eq!(counts.similarities, 0);
        assert!(counts.similarities_updated_at.is_none());
    }

    #[test]
    fn test_similarities_updated_at_tracks_newest_row() {
        let conn = test_conn();
        assert!(similarities_updated_at(&conn).unwrap().is_none());
        let before = Utc::now() - Duration::seconds(1);
        insert_similarity(
            &conn,
            &Similarity {
                pair: ChannelPair::new(1, 2).unwrap(),
                score: 0.3,
            },
        )
        .unwrap();
        let updated = similarities_updated_at(&conn).unwrap().unwrap();
        assert!(updated > before);
    }

    #[test]
    fn test_delete_cache_entries_by_prefix() {
        let conn = test_conn();
        for key in ["recs:1:a", "recs:1:b", "recs:10:a", "other%"] {
            set_cache_entry(&conn, key, "{}").unwrap();
        }
        assert_eq!(delete_cache_entries(&conn, "recs:1:").unwrap(), 2);
        assert!(get_cache_entry(&conn, "recs:10:a").unwrap().is_some());
        // The prefix is not a LIKE pattern
        assert_eq!(delete_cache_entries(&conn, "%").unwrap(), 0);
        assert_eq!(delete_cache_entries(&conn, "other%").unwrap(), 1);
    }
}
