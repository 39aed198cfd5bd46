// Recommendation cache port.
//
// Candidate lists are expensive to compute and only change when the user
// rates or adds a channel or the similarity table is rebuilt, so they are
// cached under a key that embeds all of those timestamps. A user keeps at
// most one entry: a fresh list replaces the older ones. Callers pass the
// cache in; there is no global.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::scorer::Reason;
use crate::db::models::ChannelId;
use crate::db::CacheRepository;

/// Every candidate list key starts with this.
pub const CACHE_KEY_PREFIX: &str = "recommendations_for:";

/// A user's ranked candidate list, as stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedCandidates {
    /// Candidate ids, best prediction first.
    pub ids: Vec<ChannelId>,
    pub scores: BTreeMap<ChannelId, f64>,
    pub reasons: BTreeMap<ChannelId, Vec<Reason>>,
}

#[async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedCandidates>>;
    async fn set(&self, key: &str, value: &CachedCandidates) -> Result<()>;
    /// Drop every entry whose key starts with `prefix`.
    async fn invalidate(&self, prefix: &str) -> Result<()>;
}

/// Never stores anything.
pub struct NoCache;

#[async_trait]
impl RecommendationCache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<CachedCandidates>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &CachedCandidates) -> Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }
}

/// Process-local cache, for tests and one-shot runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedCandidates>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl RecommendationCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedCandidates>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &CachedCandidates) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn invalidate(&self, prefix: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// Stores candidate lists as JSON in the database's `cache_entries` table.
pub struct DatabaseCache<C: ?Sized> {
    repo: Arc<C>,
}

impl<C: CacheRepository + ?Sized> DatabaseCache<C> {
    pub fn new(repo: Arc<C>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<C: CacheRepository + ?Sized> RecommendationCache for DatabaseCache<C> {
    async fn get(&self, key: &str) -> Result<Option<CachedCandidates>> {
        match self.repo.get_cache_entry(key).await? {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .with_context(|| format!("Corrupt cache entry {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &CachedCandidates) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.repo.set_cache_entry(key, &json).await
    }

    async fn invalidate(&self, prefix: &str) -> Result<()> {
        let removed = self.repo.delete_cache_entries(prefix).await?;
        debug!(prefix, removed, "Invalidated cached recommendations");
        Ok(())
    }
}
