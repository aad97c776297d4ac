use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SubscriptionPhase;

/// Broad error category used for consumer-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Invalid input, unsupported lifecycle transition, or other local misuse.
    Config,
    /// Transient network or transport failure.
    Network,
    /// Upstream payload had the wrong shape or could not be decoded.
    Protocol,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload surfaced across the command/event boundary.
///
/// Nothing in this subsystem is fatal to the process; every failure degrades
/// to a visible loading/error/stale state carried by this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct SyncError {
    /// High-level error category.
    pub category: SyncErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl SyncError {
    /// Construct a new sync error.
    pub fn new(
        category: SyncErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard invalid-phase-transition error.
    pub fn invalid_phase(current: SubscriptionPhase, action: impl Into<String>) -> Self {
        let action = action.into();
        Self::new(
            SyncErrorCategory::Internal,
            "invalid_phase_transition",
            format!("cannot run '{action}' while subscription is in phase {current:?}"),
        )
    }

    /// Build the local failure reported for sends on a disconnected topic.
    pub fn not_connected(topic: &str) -> Self {
        Self::new(
            SyncErrorCategory::Network,
            "send_not_connected",
            format!("channel for '{topic}' is not connected; message dropped"),
        )
    }
}

/// Map HTTP status codes to sync error categories.
pub fn classify_http_status(status: u16) -> SyncErrorCategory {
    match status {
        408 | 429 => SyncErrorCategory::Network,
        400..=499 => SyncErrorCategory::Config,
        500..=599 => SyncErrorCategory::Network,
        _ => SyncErrorCategory::Internal,
    }
}
