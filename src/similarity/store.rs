// Similarity store: the persisted pairwise similarity table.
//
// Rows are keyed by the canonical pair (lower channel id first), so each
// unordered pair has at most one row. A row is never updated in place: a
// refresh deletes it and computes it again.
//
// Both recalculation jobs run sequentially over the approved channels and
// show an indicatif progress bar while they work. Cached recommendation
// lists are dropped when either job finishes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::combined::{get_similarity, similarity_breakdown, SimilarityBreakdown, SimilarityWeights};
use super::relevance::find_relevant_similar;
use crate::db::models::{Channel, ChannelId, ChannelPair, Similarity};
use crate::db::Database;
use crate::recommend::CACHE_KEY_PREFIX;

/// Tunables of the similarity computation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilaritySettings {
    pub weights: SimilarityWeights,
    /// Whether shared subscribers make two channels candidates for comparison.
    pub subscription_candidates: bool,
    /// How far back subscriptions count as a signal (default 31 days).
    pub subscription_window: Duration,
    /// How far back a rating makes a channel "recent" (default 24 hours).
    pub recent_window: Duration,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            weights: SimilarityWeights::default(),
            subscription_candidates: false,
            subscription_window: Duration::days(31),
            recent_window: Duration::hours(24),
        }
    }
}

/// What a recalculation job did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalcSummary {
    /// Channels used as the first side of a comparison.
    pub channels_scanned: usize,
    /// Rows written.
    pub pairs_computed: usize,
    /// Rows removed before recomputing.
    pub rows_deleted: u64,
}

pub struct SimilarityStore {
    db: Arc<dyn Database>,
    settings: SimilaritySettings,
}

impl SimilarityStore {
    pub fn new(db: Arc<dyn Database>, settings: SimilaritySettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &SimilaritySettings {
        &self.settings
    }

    /// Read the stored similarity of a pair, computing and storing it first
    /// if there is no row yet. Order of the arguments does not matter.
    pub async fn calculate(&self, a: ChannelId, b: ChannelId) -> Result<f64> {
        let pair = canonical_pair(a, b)?;
        if let Some(score) = self.db.get_similarity(pair).await? {
            return Ok(score);
        }
        let (first, second) = self.load_pair(pair).await?;
        let (score, _) = self.calculate_loaded(&first, &second).await?;
        Ok(score)
    }

    /// Measure the individual signals of a pair without touching the table.
    pub async fn breakdown(&self, a: ChannelId, b: ChannelId) -> Result<SimilarityBreakdown> {
        let pair = canonical_pair(a, b)?;
        let (first, second) = self.load_pair(pair).await?;
        similarity_breakdown(
            self.db.as_ref(),
            &first,
            &second,
            &self.settings.weights,
            self.subscription_since(),
        )
        .await
    }

    /// Rebuild the whole table from scratch.
    pub async fn recalculate_all(&self) -> Result<RecalcSummary> {
        let rows_deleted = self.db.delete_all_similarities().await?;
        info!(rows_deleted, "Cleared similarity table");

        let channels = self.db.approved_channels().await?;
        let mut summary = RecalcSummary {
            rows_deleted,
            ..RecalcSummary::default()
        };
        let mut known: HashMap<ChannelId, Channel> = HashMap::new();

        let pb = progress_bar("Similarity", channels.len())?;
        for channel in &channels {
            let others = self.relevant_channels(channel.id, &mut known).await?;
            for other in &others {
                let (_, inserted) = self.calculate_loaded(channel, other).await?;
                if inserted {
                    summary.pairs_computed += 1;
                }
            }
            summary.channels_scanned += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();
        self.clear_recommendation_cache().await?;

        info!(
            channels = summary.channels_scanned,
            pairs = summary.pairs_computed,
            "Full similarity recalculation finished"
        );
        Ok(summary)
    }

    /// Refresh every pair involving a channel rated within the recent window.
    ///
    /// Rows for channels that dropped out of each other's relevant set are
    /// left as they are.
    pub async fn recalculate_recent(&self) -> Result<RecalcSummary> {
        let since = Utc::now() - self.settings.recent_window;
        let recent_ids = self.db.channels_rated_since(since).await?;
        let channels: Vec<Channel> = self
            .db
            .get_channels(&recent_ids)
            .await?
            .into_iter()
            .filter(|c| c.state.is_approved())
            .collect();

        let mut summary = RecalcSummary::default();
        let mut known: HashMap<ChannelId, Channel> = HashMap::new();

        let pb = progress_bar("Recent", channels.len())?;
        for channel in &channels {
            let others = self.relevant_channels(channel.id, &mut known).await?;
            for other in &others {
                if let Some(pair) = ChannelPair::new(channel.id, other.id) {
                    summary.rows_deleted += self.db.delete_similarity(pair).await?;
                }
                let (_, inserted) = self.calculate_loaded(channel, other).await?;
                if inserted {
                    summary.pairs_computed += 1;
                }
            }
            summary.channels_scanned += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();
        self.clear_recommendation_cache().await?;

        info!(
            channels = summary.channels_scanned,
            pairs = summary.pairs_computed,
            rows_deleted = summary.rows_deleted,
            "Recent similarity recalculation finished"
        );
        Ok(summary)
    }

    pub async fn similarity_count(&self) -> Result<i64> {
        self.db.similarity_count().await
    }

    /// Read-or-compute for two loaded channels. The flag is true when a new
    /// row was written.
    async fn calculate_loaded(&self, a: &Channel, b: &Channel) -> Result<(f64, bool)> {
        let (first, second) = if b.id < a.id { (b, a) } else { (a, b) };
        let pair = canonical_pair(first.id, second.id)?;
        if let Some(score) = self.db.get_similarity(pair).await? {
            return Ok((score, false));
        }

        let score = get_similarity(
            self.db.as_ref(),
            first,
            second,
            &self.settings.weights,
            self.subscription_since(),
        )
        .await?;
        self.db.insert_similarity(&Similarity { pair, score }).await?;
        debug!(channel1 = pair.low(), channel2 = pair.high(), score, "Stored similarity");
        Ok((score, true))
    }

    /// The relevant candidates of `channel_id`, loaded as channels.
    ///
    /// `known` caches channels across calls so a batch job loads each one once.
    async fn relevant_channels(
        &self,
        channel_id: ChannelId,
        known: &mut HashMap<ChannelId, Channel>,
    ) -> Result<Vec<Channel>> {
        let relevant = find_relevant_similar(
            self.db.as_ref(),
            channel_id,
            self.settings.subscription_candidates,
            self.subscription_since(),
        )
        .await?;

        let missing: Vec<ChannelId> = relevant
            .iter()
            .copied()
            .filter(|id| !known.contains_key(id))
            .collect();
        for channel in self.db.get_channels(&missing).await? {
            known.insert(channel.id, channel);
        }

        let mut channels = Vec::with_capacity(relevant.len());
        for id in relevant {
            match known.get(&id) {
                Some(channel) => channels.push(channel.clone()),
                None => warn!(channel_id = id, "Rated channel is missing from the channel table"),
            }
        }
        Ok(channels)
    }

    async fn load_pair(&self, pair: ChannelPair) -> Result<(Channel, Channel)> {
        let first = self
            .db
            .get_channel(pair.low())
            .await?
            .with_context(|| format!("Channel {} not found", pair.low()))?;
        let second = self
            .db
            .get_channel(pair.high())
            .await?
            .with_context(|| format!("Channel {} not found", pair.high()))?;
        Ok((first, second))
    }

    async fn clear_recommendation_cache(&self) -> Result<()> {
        let cleared = self.db.delete_cache_entries(CACHE_KEY_PREFIX).await?;
        debug!(cleared, "Dropped cached recommendation lists");
        Ok(())
    }

    fn subscription_since(&self) -> chrono::DateTime<Utc> {
        Utc::now() - self.settings.subscription_window
    }
}

fn canonical_pair(a: ChannelId, b: ChannelId) -> Result<ChannelPair> {
    ChannelPair::new(a, b)
        .with_context(|| format!("Cannot compare channel {a} with itself"))
}

fn progress_bar(label: &str, len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!("  {label} [{{bar:30}}] {{pos}}/{{len}} ({{eta}})"))
            .context("Invalid progress bar template")?,
    );
    Ok(pb)
}
