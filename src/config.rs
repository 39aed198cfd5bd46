use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;

use crate::recommend::RecommendationSettings;
use crate::similarity::{SimilaritySettings, SimilarityWeights};

/// Central configuration loaded from environment variables.
///
/// The .env file is loaded automatically at startup via dotenvy. Every
/// variable has a default, so an empty environment gives a working setup
/// backed by ./affinity.db.
pub struct Config {
    pub db_path: String,
    /// PostgreSQL connection URL (when set and starts with postgres://, uses Postgres backend)
    pub database_url: Option<String>,
    pub similarity: SimilaritySettings,
    pub recommendations: RecommendationSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let defaults = SimilaritySettings::default();

        let subscription_weight: f64 = parse_var(
            "AFFINITY_SUBSCRIPTION_WEIGHT",
            defaults.weights.subscription,
        )?;
        if !subscription_weight.is_finite() || subscription_weight < 0.0 {
            anyhow::bail!(
                "AFFINITY_SUBSCRIPTION_WEIGHT must be a non-negative number, got {subscription_weight}"
            );
        }
        let window_days: i64 = parse_var("AFFINITY_SUBSCRIPTION_WINDOW_DAYS", 31)?;
        let recent_hours: i64 = parse_var("AFFINITY_RECENT_WINDOW_HOURS", 24)?;
        if window_days <= 0 || recent_hours <= 0 {
            anyhow::bail!(
                "AFFINITY_SUBSCRIPTION_WINDOW_DAYS and AFFINITY_RECENT_WINDOW_HOURS must be positive"
            );
        }

        Ok(Self {
            db_path: env::var("AFFINITY_DB_PATH").unwrap_or_else(|_| "./affinity.db".to_string()),
            database_url: env::var("DATABASE_URL").ok(),
            similarity: SimilaritySettings {
                weights: SimilarityWeights {
                    subscription: subscription_weight,
                    ..defaults.weights
                },
                subscription_candidates: parse_flag("AFFINITY_SUBSCRIPTION_CANDIDATES")?,
                subscription_window: Duration::days(window_days),
                recent_window: Duration::hours(recent_hours),
            },
            recommendations: RecommendationSettings::default(),
        })
    }

    /// Whether DATABASE_URL selects the PostgreSQL backend.
    pub fn postgres_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .filter(|url| url.starts_with("postgres://") || url.starts_with("postgresql://"))
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(default),
    }
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).with_context(|| format!("Invalid value for {name}: {raw:?}")),
        Err(_) => Ok(false),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("TRUE").unwrap());
        assert!(parse_bool(" on ").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(!parse_bool("").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
