// Database schema: table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent, so safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Channels known to the guide (mirrored, read-only to the engine)
        CREATE TABLE IF NOT EXISTS channels (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT,                          -- NULL for sites without a feed
            state TEXT NOT NULL DEFAULT 'N',   -- one-letter moderation state
            archived INTEGER NOT NULL DEFAULT 0,
            language TEXT
        );

        CREATE TABLE IF NOT EXISTS channel_categories (
            channel_id INTEGER NOT NULL,
            category TEXT NOT NULL,
            PRIMARY KEY (channel_id, category)
        );

        -- One rating per (user, channel); NULL rating means cleared
        CREATE TABLE IF NOT EXISTS ratings (
            user_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            rating INTEGER CHECK (rating BETWEEN 1 AND 5),
            timestamp TEXT NOT NULL,
            PRIMARY KEY (user_id, channel_id)
        );

        -- Append-only subscription log
        CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id INTEGER NOT NULL,
            ip_address TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            ignore_for_recommendations INTEGER NOT NULL DEFAULT 0
        );

        -- Channels a user added to their collection (never recommended back)
        CREATE TABLE IF NOT EXISTS added_channels (
            user_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (user_id, channel_id)
        );

        -- Pairwise channel similarity, one row per unordered pair
        CREATE TABLE IF NOT EXISTS similarities (
            channel1_id INTEGER NOT NULL,
            channel2_id INTEGER NOT NULL,
            score REAL NOT NULL,
            PRIMARY KEY (channel1_id, channel2_id),
            CHECK (channel1_id < channel2_id)
        );

        -- Key/value store backing the recommendation cache
        CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Index for finding co-raters and recently rated channels
        CREATE INDEX IF NOT EXISTS idx_ratings_channel
            ON ratings(channel_id);
        CREATE INDEX IF NOT EXISTS idx_ratings_timestamp
            ON ratings(timestamp);

        -- Index for subscription windows per channel and per address
        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON subscriptions(channel_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_subscriptions_ip
            ON subscriptions(ip_address, timestamp);

        -- Index for similarity lookups by the higher-id side
        CREATE INDEX IF NOT EXISTS idx_similarities_channel2
            ON similarities(channel2_id);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: add computed_at to similarities so `status` can report
    // when the table was last refreshed.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE similarities ADD COLUMN computed_at TEXT;")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
