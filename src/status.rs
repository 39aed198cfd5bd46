// System status display: row counts per table and similarity table age.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::db::Database;

/// Display system status to the terminal.
///
/// `db_display_path` is the SQLite file, or `None` when running on Postgres.
pub async fn show(db: &Arc<dyn Database>, db_display_path: Option<&str>) -> Result<()> {
    match db_display_path {
        Some(path) => {
            if !Path::new(path).exists() {
                show_uninitialized();
                return Ok(());
            }
            let file_size = std::fs::metadata(path)
                .map(|m| format_bytes(m.len()))
                .unwrap_or_else(|_| "unknown".to_string());
            println!("Database: {} ({})", path, file_size);
        }
        None => println!("Database: PostgreSQL"),
    }

    let counts = db.table_counts().await?;
    println!("Channels: {}", counts.channels);
    println!("Ratings: {}", counts.ratings);
    println!("Subscriptions: {}", counts.subscriptions);
    println!("Added channels: {}", counts.added_channels);

    match counts.similarities_updated_at {
        Some(updated_at) if counts.similarities > 0 => {
            println!(
                "Similarities: {} pairs (last computed {})",
                counts.similarities,
                updated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        _ => {
            println!("Similarities: none computed yet");
            println!("  Run `affinity calculate --full` to build the table");
        }
    }

    Ok(())
}

/// Shown when there is no SQLite file to open yet.
pub fn show_uninitialized() {
    println!("Database: not initialized");
    println!("\nRun `affinity init` to set up the database.");
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
