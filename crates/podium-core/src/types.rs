use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SyncError;

/// Frame kind carrying the initial ranking list after a channel opens.
pub const FRAME_LEADERBOARD_INIT: &str = "leaderboard_init";
/// Frame kind carrying a full-replacement ranking push.
pub const FRAME_LEADERBOARD_UPDATE: &str = "leaderboard_update";
/// Outbound action asking the server to re-broadcast current standings.
pub const ACTION_REFRESH: &str = "refresh";

/// Rating assumed for entrants the upstream has not rated yet.
pub const DEFAULT_RATING: f64 = 1500.0;

/// Logical stream identifier; the unique key into the channel registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Wrap an arbitrary topic path.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Ranking feed topic for one competition.
    pub fn leaderboard(competition_id: u64) -> Self {
        Self(format!("leaderboard/{competition_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of the single live connection bound to one topic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelState {
    /// Connection attempt is in flight.
    Connecting,
    /// Connection is established; frames flow and sends are accepted.
    Open,
    /// Connection ended; the registry replaces it on the next open.
    Closed,
}

/// Lifecycle of one consumer's interest in one topic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Subscription exists but has not been started.
    Idle,
    /// Channel open is in flight.
    Connecting,
    /// Channel is live; dispatch and sends are active.
    Connected,
    /// Channel dropped; a reconnect timer is (or would be) pending.
    ReconnectWait,
    /// Explicitly unsubscribed; no callback may fire after this.
    Terminated,
}

/// One structured inbound message on a channel.
///
/// Only the two leaderboard kinds are interpreted by the reconciler; every
/// other kind is passed through to the consumer untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamFrame {
    /// Frame discriminator, `type` on the wire.
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary frame payload, `data` on the wire.
    #[serde(rename = "data", default)]
    pub payload: Value,
}

/// Tolerant deserialization target for one upstream ranking entry.
///
/// Every field is optional; the upstream serializer emits different subsets
/// depending on whether the entrant is a registered user or an imported
/// team, and numeric fields may arrive as JSON strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WireEntry {
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub user_username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub kaggle_team_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub best_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub user_elo_rating: Option<f64>,
}

/// Resolved display entry consumed by presentation code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    /// Upstream row identifier when provided.
    pub id: Option<String>,
    /// Position as produced upstream; never re-derived locally.
    pub rank: u32,
    /// Display name after the documented fallback chain.
    pub identity: String,
    /// Best available score; `None` renders as "N/A".
    pub score: Option<f64>,
    /// Competitive rating, defaulted when the upstream omits it.
    pub rating: f64,
}

/// The reconciler's owned ranking state, replaced wholesale on every
/// snapshot or recognized frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RankingState {
    /// Entries in upstream order; never locally re-sorted.
    pub entries: Vec<LeaderboardEntry>,
    /// True until the first snapshot fetch resolves.
    pub loading: bool,
    /// Last snapshot fetch failure, cleared on success or reconnect.
    pub error: Option<SyncError>,
    /// Whether the live channel is currently connected.
    pub connected: bool,
}

/// Command channel input accepted by the reconciler runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncCommand {
    /// Re-run the one-shot snapshot fetch regardless of connectivity.
    Refresh,
    /// Send an arbitrary JSON action over the live channel.
    Send(Value),
    /// Unsubscribe and freeze the last ranking state for display.
    Stop,
}

/// Event channel output emitted by the reconciler runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SyncEvent {
    /// Full ranking state replacement.
    RankingChanged(RankingState),
    /// Unrecognized frame passed through uninterpreted.
    Frame(StreamFrame),
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_leaderboard_topic_path() {
        assert_eq!(Topic::leaderboard(5).as_str(), "leaderboard/5");
        assert_eq!(Topic::new("scores/42").to_string(), "scores/42");
    }

    #[test]
    fn deserializes_frame_from_wire_names() {
        let frame: StreamFrame = serde_json::from_value(json!({
            "type": "leaderboard_update",
            "data": {"entries": []},
        }))
        .expect("frame should deserialize");

        assert_eq!(frame.kind, FRAME_LEADERBOARD_UPDATE);
        assert_eq!(frame.payload, json!({"entries": []}));
    }

    #[test]
    fn frame_payload_defaults_to_null_when_absent() {
        let frame: StreamFrame = serde_json::from_value(json!({"type": "pong"}))
            .expect("frame without data should deserialize");
        assert_eq!(frame.payload, Value::Null);
    }

    #[test]
    fn wire_entry_accepts_numeric_and_string_ids() {
        let numeric: WireEntry =
            serde_json::from_value(json!({"id": 17, "rank": 1})).expect("numeric id");
        assert_eq!(numeric.id.as_deref(), Some("17"));

        let text: WireEntry =
            serde_json::from_value(json!({"id": "a", "rank": 2})).expect("string id");
        assert_eq!(text.id.as_deref(), Some("a"));
    }

    #[test]
    fn wire_entry_parses_string_scores() {
        let entry: WireEntry = serde_json::from_value(json!({
            "rank": 1,
            "best_score": "0.9812",
            "user_elo_rating": 1620,
        }))
        .expect("entry should deserialize");

        assert_eq!(entry.best_score, Some(0.9812));
        assert_eq!(entry.user_elo_rating, Some(1620.0));
    }

    #[test]
    fn wire_entry_tolerates_unparseable_numerics() {
        let entry: WireEntry = serde_json::from_value(json!({
            "rank": 3,
            "score": "not-a-score",
            "user_elo_rating": true,
        }))
        .expect("entry should still deserialize");

        assert_eq!(entry.score, None);
        assert_eq!(entry.user_elo_rating, None);
    }

    #[test]
    fn ranking_state_starts_empty_and_disconnected() {
        let state = RankingState::default();
        assert!(state.entries.is_empty());
        assert!(!state.loading);
        assert!(!state.connected);
        assert_eq!(state.error, None);
    }
}
