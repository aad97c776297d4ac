//! Boundary normalization for snapshot responses and inbound frames.
//!
//! All defensive shape handling lives here: malformed payloads collapse to
//! an empty entry list (or a dropped frame) instead of surfacing as errors
//! deeper in the pipeline.

use serde_json::Value;

use crate::types::{
    DEFAULT_RATING, FRAME_LEADERBOARD_INIT, FRAME_LEADERBOARD_UPDATE, LeaderboardEntry,
    StreamFrame, WireEntry,
};

const UNKNOWN_IDENTITY: &str = "Unknown";

/// Parse one raw inbound text frame.
///
/// Returns `None` when the text is not a valid frame; the caller logs and
/// drops it.
pub fn parse_frame(text: &str) -> Option<StreamFrame> {
    serde_json::from_str::<StreamFrame>(text).ok()
}

/// Normalize a snapshot response body into resolved entries.
///
/// Accepts a paginated body (`{results: [...]}`) or a bare list; anything
/// else collapses to an empty list rather than an error.
pub fn snapshot_entries(payload: &Value) -> Vec<LeaderboardEntry> {
    let list = match payload.get("results") {
        Some(results) if results.is_array() => results,
        _ if payload.is_array() => payload,
        _ => return Vec::new(),
    };
    resolve_entries(list)
}

/// Extract ranking entries from a recognized leaderboard frame.
///
/// Returns `None` for every other frame kind so the caller can pass it
/// through uninterpreted.
pub fn frame_entries(frame: &StreamFrame) -> Option<Vec<LeaderboardEntry>> {
    if frame.kind != FRAME_LEADERBOARD_INIT && frame.kind != FRAME_LEADERBOARD_UPDATE {
        return None;
    }

    let entries = match frame.payload.get("entries") {
        Some(entries) if entries.is_array() => resolve_entries(entries),
        _ => Vec::new(),
    };
    Some(entries)
}

/// Apply the documented field fallbacks to one wire entry.
pub fn resolve_entry(wire: WireEntry) -> LeaderboardEntry {
    let identity = non_empty(wire.display_name)
        .or_else(|| non_empty(wire.user_username))
        .or_else(|| non_empty(wire.kaggle_team_name))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_owned());

    LeaderboardEntry {
        id: wire.id,
        rank: wire.rank.unwrap_or(0),
        identity,
        score: wire.best_score.or(wire.score),
        rating: wire.user_elo_rating.unwrap_or(DEFAULT_RATING),
    }
}

fn resolve_entries(list: &Value) -> Vec<LeaderboardEntry> {
    serde_json::from_value::<Vec<WireEntry>>(list.clone())
        .map(|wire| wire.into_iter().map(resolve_entry).collect())
        .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}
