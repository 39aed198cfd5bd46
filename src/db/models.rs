// Data models: Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChannelId = i64;
pub type UserId = i64;

/// Moderation state of a channel, stored as its one-letter code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    #[serde(rename = "N")]
    New,
    #[serde(rename = "D")]
    DontKnow,
    #[serde(rename = "R")]
    Rejected,
    #[serde(rename = "A")]
    Approved,
    #[serde(rename = "U")]
    Audio,
    #[serde(rename = "B")]
    Broken,
    #[serde(rename = "S")]
    Suspended,
}

impl ChannelState {
    pub fn code(&self) -> &'static str {
        match self {
            ChannelState::New => "N",
            ChannelState::DontKnow => "D",
            ChannelState::Rejected => "R",
            ChannelState::Approved => "A",
            ChannelState::Audio => "U",
            ChannelState::Broken => "B",
            ChannelState::Suspended => "S",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        Ok(match code {
            "N" => ChannelState::New,
            "D" => ChannelState::DontKnow,
            "R" => ChannelState::Rejected,
            "A" => ChannelState::Approved,
            "U" => ChannelState::Audio,
            "B" => ChannelState::Broken,
            "S" => ChannelState::Suspended,
            other => anyhow::bail!("Unknown channel state code: {other:?}"),
        })
    }

    /// Audio channels go through the same review as video ones and count as approved.
    pub fn is_approved(&self) -> bool {
        matches!(self, ChannelState::Approved | ChannelState::Audio)
    }
}

/// Whether a channel is an RSS feed or a plain site (no feed URL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Feed,
    Site,
}

impl std::str::FromStr for ChannelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "feed" => Ok(ChannelKind::Feed),
            "site" => Ok(ChannelKind::Site),
            other => anyhow::bail!("Unknown recommendations filter: {other:?}"),
        }
    }
}

/// A channel as seen by the recommendation engine. Read-only here; the
/// channel guide owns the full record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub state: ChannelState,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        if self.url.is_some() {
            ChannelKind::Feed
        } else {
            ChannelKind::Site
        }
    }

    /// Approved and still publishing.
    pub fn is_recommendable(&self) -> bool {
        self.state.is_approved() && !self.archived
    }
}

/// A star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            anyhow::bail!(
                "Rating must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            );
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl TryFrom<u8> for Stars {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Stars::new(value)
    }
}

impl From<Stars> for u8 {
    fn from(stars: Stars) -> u8 {
        stars.0
    }
}

impl fmt::Display for Stars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's rating of one channel. `stars` is `None` when the user
/// cleared a rating they had given before.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub stars: Option<Stars>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A subscription event from the subscribe button or a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel_id: ChannelId,
    pub ip_address: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ignore_for_recommendations: bool,
}

impl Subscription {
    /// Recorded when the subscriber's address could not be determined.
    pub const UNKNOWN_IP: &'static str = "0.0.0.0";

    /// Whether this event may be used as a similarity signal: newer than
    /// `since`, not flagged as noise, and from a known address.
    pub fn counts_for_recommendations(&self, since: DateTime<Utc>) -> bool {
        self.timestamp > since
            && !self.ignore_for_recommendations
            && self.ip_address != Self::UNKNOWN_IP
    }
}

/// A channel a user has added to their own collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedChannel {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// An unordered channel pair in canonical form: `low < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ChannelPair {
    low: ChannelId,
    high: ChannelId,
}

impl ChannelPair {
    /// Canonicalize two distinct channel ids. Returns `None` for a self-pair.
    pub fn new(a: ChannelId, b: ChannelId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> ChannelId {
        self.low
    }

    pub fn high(&self) -> ChannelId {
        self.high
    }

    /// The other side of the pair, if `id` is one of its members.
    pub fn other(&self, id: ChannelId) -> Option<ChannelId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

/// A stored similarity row. `score` is the blended similarity in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub pair: ChannelPair,
    pub score: f64,
}

/// Row counts shown by `affinity status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub channels: i64,
    pub ratings: i64,
    pub subscriptions: i64,
    pub added_channels: i64,
    pub similarities: i64,
    /// When the newest similarity row was written, if any.
    pub similarities_updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_canonical() {
        let pair = ChannelPair::new(9, 3).unwrap();
        assert_eq!(pair.low(), 3);
        assert_eq!(pair.high(), 9);
        assert_eq!(pair, ChannelPair::new(3, 9).unwrap());
    }

    #[test]
    fn test_self_pair_rejected() {
        assert!(ChannelPair::new(4, 4).is_none());
    }

    #[test]
    fn test_pair_other_side() {
        let pair = ChannelPair::new(1, 2).unwrap();
        assert_eq!(pair.other(1), Some(2));
        assert_eq!(pair.other(2), Some(1));
        assert_eq!(pair.other(7), None);
    }

    #[test]
    fn test_stars_bounds() {
        assert!(Stars::new(0).is_err());
        assert!(Stars::new(6).is_err());
        assert_eq!(Stars::new(5).unwrap().get(), 5);
    }

    #[test]
    fn test_stars_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Stars>("3").is_ok());
        assert!(serde_json::from_str::<Stars>("7").is_err());
    }

    #[test]
    fn test_state_codes_round_trip() {
        for state in [
            ChannelState::New,
            ChannelState::DontKnow,
            ChannelState::Rejected,
            ChannelState::Approved,
            ChannelState::Audio,
            ChannelState::Broken,
            ChannelState::Suspended,
        ] {
            assert_eq!(ChannelState::from_code(state.code()).unwrap(), state);
        }
        assert!(ChannelState::from_code("X").is_err());
    }

    #[test]
    fn test_audio_counts_as_approved() {
        assert!(ChannelState::Audio.is_approved());
        assert!(ChannelState::Approved.is_approved());
        assert!(!ChannelState::New.is_approved());
    }

    #[test]
    fn test_unknown_ip_never_counts() {
        let since = Utc::now() - chrono::Duration::days(31);
        let sub = Subscription {
            channel_id: 1,
            ip_address: Subscription::UNKNOWN_IP.to_string(),
            timestamp: Utc::now(),
            ignore_for_recommendations: false,
        };
        assert!(!sub.counts_for_recommendations(since));
    }

    #[test]
    fn test_channel_kind_from_url() {
        let mut channel = Channel {
            id: 1,
            name: "News".to_string(),
            url: Some("http://example.com/feed.rss".to_string()),
            state: ChannelState::Approved,
            archived: false,
            language: None,
            categories: BTreeSet::new(),
        };
        assert_eq!(channel.kind(), ChannelKind::Feed);
        channel.url = None;
        assert_eq!(channel.kind(), ChannelKind::Site);
    }
}
