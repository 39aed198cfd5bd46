// Personal recommendations for one user, as served to the channel guide.
//
// Pipeline: the user's ratings -> similarity rows touching the rated channels
// -> scorer -> confidence filter -> threshold, already-added exclusion and cap
// -> (cached) -> feed/site and language filters -> reasons attached -> page.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::cache::{CachedCandidates, RecommendationCache, CACHE_KEY_PREFIX};
use super::filter::filter_scores;
use super::scorer::{calculate_scores, Reason, MAX_REASONS};
use crate::db::models::{Channel, ChannelId, ChannelKind, Rating, Stars, UserId};
use crate::db::{ChannelRepository, Database, SimilarityRepository};

/// Tunables of the served recommendation list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSettings {
    /// Predictions below this are not recommended (default 3.25)
    pub min_predicted_rating: f64,
    /// At most this many candidates are kept per user (default 99)
    pub max_candidates: usize,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            min_predicted_rating: 3.25,
            max_candidates: 99,
        }
    }
}

/// Which slice of a user's recommendations to return.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationQuery {
    pub start: usize,
    pub length: usize,
    pub kind: Option<ChannelKind>,
    /// Only channels in one of these languages. Empty means no restriction.
    pub languages: Vec<String>,
}

impl Default for RecommendationQuery {
    fn default() -> Self {
        Self {
            start: 0,
            length: 10,
            kind: None,
            languages: Vec::new(),
        }
    }
}

/// Scorer output after the confidence filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recommendations {
    pub scores: BTreeMap<ChannelId, f64>,
    /// Ascending by contribution, at most three per channel.
    pub reasons: BTreeMap<ChannelId, Vec<Reason>>,
}

/// A rated channel shown as justification, with its contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonChannel {
    pub channel: Channel,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedChannel {
    pub channel: Channel,
    /// Predicted rating.
    pub guessed: f64,
    /// Strongest contribution first.
    pub reasons: Vec<ReasonChannel>,
}

/// Predicted ratings for the unrated neighbours of `ratings`.
///
/// Cleared ratings are dropped before scoring.
pub async fn recommend_from_ratings<D>(db: &D, ratings: &[Rating]) -> Result<Recommendations>
where
    D: ChannelRepository + SimilarityRepository + ?Sized,
{
    let rated: BTreeMap<ChannelId, Stars> = ratings
        .iter()
        .filter_map(|r| r.stars.map(|s| (r.channel_id, s)))
        .collect();
    if rated.is_empty() {
        return Ok(Recommendations::default());
    }

    let ids: Vec<ChannelId> = rated.keys().copied().collect();
    let similarities = db.similarities_touching(&ids).await?;
    let scored = calculate_scores(&similarities, &rated);
    let scores = filter_scores(db, &scored).await?;
    debug!(
        rated = rated.len(),
        neighbours = scored.scores.len(),
        kept = scores.len(),
        "Scored recommendation candidates"
    );

    Ok(Recommendations {
        scores,
        reasons: scored.reasons,
    })
}

/// A page of recommendations for `user_id`, best prediction first.
///
/// Empty when the user has rated nothing or nothing clears the threshold.
pub async fn get_recommendations(
    db: &dyn Database,
    user_id: UserId,
    query: &RecommendationQuery,
    settings: &RecommendationSettings,
    cache: &dyn RecommendationCache,
) -> Result<Vec<RecommendedChannel>> {
    let Some(candidates) = candidates_for(db, user_id, settings, cache).await? else {
        return Ok(Vec::new());
    };
    let channels = load_candidates(db, &candidates, query.kind).await?;

    let channels: Vec<Channel> = if query.languages.is_empty() {
        channels
    } else {
        channels
            .into_iter()
            .filter(|c| {
                c.language
                    .as_ref()
                    .is_some_and(|lang| query.languages.contains(lang))
            })
            .collect()
    };

    let reason_ids: Vec<ChannelId> = channels
        .iter()
        .filter_map(|c| candidates.reasons.get(&c.id))
        .flat_map(|list| top_reasons(list).iter().map(|r| r.channel_id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let reason_channels: HashMap<ChannelId, Channel> = db
        .get_channels(&reason_ids)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut results: Vec<RecommendedChannel> = channels
        .into_iter()
        .filter_map(|channel| {
            let guessed = *candidates.scores.get(&channel.id)?;
            let mut reasons: Vec<ReasonChannel> = candidates
                .reasons
                .get(&channel.id)
                .map(|list| {
                    top_reasons(list)
                        .iter()
                        .filter_map(|r| {
                            reason_channels.get(&r.channel_id).map(|c| ReasonChannel {
                                channel: c.clone(),
                                score: r.score,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            reasons.sort_by(|a, b| b.score.total_cmp(&a.score));
            Some(RecommendedChannel {
                channel,
                guessed,
                reasons,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.guessed
            .total_cmp(&a.guessed)
            .then(a.channel.id.cmp(&b.channel.id))
    });

    Ok(results
        .into_iter()
        .skip(query.start)
        .take(query.length)
        .collect())
}

/// How many channels would be recommended to `user_id` under `kind`.
///
/// The language allow-list does not apply to the count.
pub async fn count_recommendations(
    db: &dyn Database,
    user_id: UserId,
    kind: Option<ChannelKind>,
    settings: &RecommendationSettings,
    cache: &dyn RecommendationCache,
) -> Result<usize> {
    let Some(candidates) = candidates_for(db, user_id, settings, cache).await? else {
        return Ok(0);
    };
    Ok(load_candidates(db, &candidates, kind).await?.len())
}

/// Cache key for a user's candidate list. Any new rating or added channel
/// changes it, and so does any write to the similarity table.
pub fn cache_key(
    user_id: UserId,
    latest_activity: DateTime<Utc>,
    similarities_updated_at: Option<DateTime<Utc>>,
) -> String {
    let table = similarities_updated_at.map_or_else(|| "empty".to_string(), |t| t.to_rfc3339());
    format!(
        "{}{}:{table}",
        user_cache_prefix(user_id),
        latest_activity.to_rfc3339()
    )
}

/// Prefix shared by every cache key of one user.
fn user_cache_prefix(user_id: UserId) -> String {
    format!("{CACHE_KEY_PREFIX}{user_id}:")
}

/// The user's ranked candidate list, from the cache when possible.
/// `None` when the user has no ratings or no candidate survives.
async fn candidates_for(
    db: &dyn Database,
    user_id: UserId,
    settings: &RecommendationSettings,
    cache: &dyn RecommendationCache,
) -> Result<Option<CachedCandidates>> {
    let ratings = db.ratings_by_user(user_id).await?;
    let Some(latest_rating) = ratings.iter().map(|r| r.timestamp).max() else {
        return Ok(None);
    };
    let added = db.added_channels(user_id).await?;
    let latest = added
        .iter()
        .map(|a| a.timestamp)
        .max()
        .map_or(latest_rating, |t| t.max(latest_rating));
    let key = cache_key(user_id, latest, db.similarities_updated_at().await?);

    let candidates = match cache.get(&key).await? {
        Some(hit) => {
            debug!(user_id, "Recommendation cache hit");
            hit
        }
        None => {
            let recommendations = recommend_from_ratings(db, &ratings).await?;
            let added_ids: HashSet<ChannelId> = added.iter().map(|a| a.channel_id).collect();
            let candidates = rank_candidates(recommendations, &added_ids, settings);
            cache.invalidate(&user_cache_prefix(user_id)).await?;
            cache.set(&key, &candidates).await?;
            candidates
        }
    };

    if candidates.ids.is_empty() {
        return Ok(None);
    }
    Ok(Some(candidates))
}

/// Keep predictions at or above the threshold that the user has not added,
/// best first, capped.
fn rank_candidates(
    recommendations: Recommendations,
    added: &HashSet<ChannelId>,
    settings: &RecommendationSettings,
) -> CachedCandidates {
    let mut ranked: Vec<(ChannelId, f64)> = recommendations
        .scores
        .iter()
        .map(|(&id, &score)| (id, score))
        .filter(|(id, score)| *score >= settings.min_predicted_rating && !added.contains(id))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(settings.max_candidates);

    let ids: Vec<ChannelId> = ranked.iter().map(|(id, _)| *id).collect();
    let keep: HashSet<ChannelId> = ids.iter().copied().collect();
    let mut reasons = recommendations.reasons;
    reasons.retain(|id, _| keep.contains(id));

    CachedCandidates {
        ids,
        scores: ranked.into_iter().collect(),
        reasons,
    }
}

async fn load_candidates(
    db: &dyn Database,
    candidates: &CachedCandidates,
    kind: Option<ChannelKind>,
) -> Result<Vec<Channel>> {
    let channels = db.get_channels(&candidates.ids).await?;
    Ok(match kind {
        Some(kind) => channels.into_iter().filter(|c| c.kind() == kind).collect(),
        None => channels,
    })
}

fn top_reasons(list: &[Reason]) -> &[Reason] {
    &list[list.len().saturating_sub(MAX_REASONS)..]
}
