use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use affinity::config::Config;
use affinity::db::models::{ChannelId, ChannelKind, UserId};
use affinity::db::Database;
use affinity::recommend::{DatabaseCache, RecommendationQuery};
use affinity::similarity::SimilarityStore;

/// Affinity: channel similarity and personalized recommendations.
///
/// Computes a pairwise similarity table from ratings, languages, categories
/// and (optionally) shared subscribers, and predicts which channels a user
/// will like from the ones they already rated.
#[derive(Parser)]
#[command(name = "affinity", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Import channels, ratings, subscriptions and added channels from JSON
    Import {
        /// Path to the dataset file
        path: PathBuf,
    },

    /// Refresh the similarity table (recently rated channels by default)
    Calculate {
        /// Rebuild the whole table instead of the recent channels only
        #[arg(long)]
        full: bool,
    },

    /// Show the similarity of two channels, computing it if needed
    Similarity {
        a: ChannelId,
        b: ChannelId,
    },

    /// Show recommendations for a user
    Recommend {
        user: UserId,

        /// Index of the first result to show (default: 0)
        #[arg(long, default_value = "0")]
        start: usize,

        /// Number of results to show (default: 10)
        #[arg(long, default_value = "10")]
        length: usize,

        /// Only feeds or only sites
        #[arg(long)]
        filter: Option<ChannelKind>,

        /// Only channels in this language (repeatable)
        #[arg(long = "language")]
        languages: Vec<String>,

        /// Print the number of recommendations instead of listing them
        #[arg(long)]
        count: bool,
    },

    /// Measure prediction accuracy with a hold-out split of the ratings
    Evaluate,

    /// Show system status (row counts, similarity table age)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("affinity=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing Affinity database...");
            let config = Config::load()?;
            let db = init_database(&config).await?;
            let table_count = db.table_count().await?;
            match config.postgres_url() {
                Some(_) => println!("Database initialized on PostgreSQL"),
                None => println!("Database initialized at: {}", config.db_path),
            }
            println!("Tables created: {table_count}");
            println!("\nAffinity is ready. Next step: load some data");
            println!("  affinity import dataset.json");
        }

        Commands::Import { path } => {
            let config = Config::load()?;
            let db = init_database(&config).await?;
            let dataset = affinity::dataset::Dataset::from_path(&path)?;
            println!("Importing {}...", path.display());
            let summary = affinity::dataset::import_dataset(db.as_ref(), &dataset).await?;
            affinity::output::terminal::display_import_summary(&summary);
        }

        Commands::Calculate { full } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let store = SimilarityStore::new(db, config.similarity.clone());

            let (label, summary) = if full {
                println!("Recalculating every channel pair...");
                ("Full recalculation", store.recalculate_all().await?)
            } else {
                println!("Recalculating recently rated channels...");
                ("Recent recalculation", store.recalculate_recent().await?)
            };
            let total = store.similarity_count().await?;
            affinity::output::terminal::display_recalc_summary(label, &summary, total);
        }

        Commands::Similarity { a, b } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let first = db
                .get_channel(a)
                .await?
                .with_context(|| format!("Channel {a} not found"))?;
            let second = db
                .get_channel(b)
                .await?
                .with_context(|| format!("Channel {b} not found"))?;

            let store = SimilarityStore::new(db, config.similarity.clone());
            let score = store.calculate(a, b).await?;
            let parts = store.breakdown(a, b).await?;
            affinity::output::terminal::display_similarity(&first, &second, score, &parts);
        }

        Commands::Recommend {
            user,
            start,
            length,
            filter,
            languages,
            count,
        } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let cache = DatabaseCache::new(Arc::clone(&db));

            if count {
                let n = affinity::recommend::count_recommendations(
                    db.as_ref(),
                    user,
                    filter,
                    &config.recommendations,
                    &cache,
                )
                .await?;
                println!("{n}");
                return Ok(());
            }

            let query = RecommendationQuery {
                start,
                length,
                kind: filter,
                languages,
            };
            let results = affinity::recommend::get_recommendations(
                db.as_ref(),
                user,
                &query,
                &config.recommendations,
                &cache,
            )
            .await?;
            affinity::output::terminal::display_recommendations(user, start, &results);
        }

        Commands::Evaluate => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            println!("Evaluating predictions on a hold-out split...");
            let report = affinity::evaluate::evaluate(db.as_ref()).await?;
            affinity::output::terminal::display_evaluation(&report);
            if report.rmse.is_none() {
                println!(
                    "{}",
                    "Need odd-id users for training and even-id users with 7+ ratings to verify."
                        .dimmed()
                );
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            let on_postgres = config.postgres_url().is_some();
            if !on_postgres && !std::path::Path::new(&config.db_path).exists() {
                affinity::status::show_uninitialized();
                return Ok(());
            }
            let db = open_database(&config).await?;
            let path = (!on_postgres).then_some(config.db_path.as_str());
            affinity::status::show(&db, path).await?;
        }
    }

    Ok(())
}

/// Open the configured database (fails if a SQLite file doesn't exist yet).
async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    if let Some(url) = config.postgres_url() {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            return affinity::db::connect_postgres(url).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = url;
            anyhow::bail!(
                "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
                 Rebuild with: cargo build --features postgres"
            );
        }
    }
    open_sqlite(config)
}

/// Initialize the database (create if needed).
async fn init_database(config: &Config) -> Result<Arc<dyn Database>> {
    if let Some(url) = config.postgres_url() {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            return affinity::db::connect_postgres(url).await;
        }
        #[cfg(not(feature = "postgres"))]
        {
            let _ = url;
            anyhow::bail!(
                "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
                 Rebuild with: cargo build --features postgres"
            );
        }
    }
    initialize_sqlite(config)
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    affinity::db::open_sqlite(&config.db_path)
}

#[cfg(feature = "sqlite")]
fn initialize_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    affinity::db::initialize_sqlite(&config.db_path)
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &Config) -> Result<Arc<dyn Database>> {
    anyhow::bail!(
        "{}\nSet DATABASE_URL to a PostgreSQL URL or rebuild with the 'sqlite' feature.",
        "SQLite support is not compiled in.".red()
    )
}

#[cfg(not(feature = "sqlite"))]
fn initialize_sqlite(config: &Config) -> Result<Arc<dyn Database>> {
    open_sqlite(config)
}
