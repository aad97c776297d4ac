//! Core contract shared between the sync runtime and presentation consumers.
//!
//! This crate defines the ranking/frame protocol, the subscription lifecycle
//! model, reconnect policy, boundary normalization, tier classification, and
//! common error/channel abstractions.

/// Async command/event channel primitives.
pub mod channel;
/// Stable sync error types and HTTP classification helpers.
pub mod error;
/// Boundary normalization for snapshots and inbound frames.
pub mod normalize;
/// Fixed-interval reconnect policy used by subscription retry loops.
pub mod retry;
/// Subscription lifecycle state machine.
pub mod state_machine;
/// Rating tier classifier.
pub mod tier;
/// Wire and domain types (topics, frames, entries, commands, events).
pub mod types;

pub use channel::{EventStream, SyncChannelError, SyncChannels};
pub use error::{SyncError, SyncErrorCategory, classify_http_status};
pub use retry::{DEFAULT_RECONNECT_INTERVAL_MS, ReconnectPolicy};
pub use state_machine::SubscriptionStateMachine;
pub use tier::{RATING_TIERS, RatingTier, classify};
pub use types::{
    ACTION_REFRESH, ChannelState, DEFAULT_RATING, FRAME_LEADERBOARD_INIT,
    FRAME_LEADERBOARD_UPDATE, LeaderboardEntry, RankingState, StreamFrame, SubscriptionPhase,
    SyncCommand, SyncEvent, Topic, WireEntry,
};
