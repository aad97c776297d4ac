//! Leaderboard reconciler.
//!
//! Merges the one-shot snapshot fetch with the pushed frame stream into one
//! authoritative ranking state. The snapshot and the subscription start
//! concurrently with no ordering between them; both are idempotent full
//! replacements, so whichever lands last wins.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use podium_core::{
    EventStream, LeaderboardEntry, RankingState, ReconnectPolicy, StreamFrame, SyncChannelError,
    SyncChannels, SyncCommand, SyncError, SyncEvent, Topic, normalize,
};

use crate::{
    fetch::{SnapshotApi, fetch_snapshot},
    registry::ChannelRegistry,
    subscription::{SubscriptionNotice, spawn_subscription},
};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 128;

/// Consumer handle for one reconciled leaderboard.
#[derive(Clone)]
pub struct ReconcilerHandle {
    channels: SyncChannels,
}

impl ReconcilerHandle {
    /// Subscribe to ranking state replacements and passthrough frames.
    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }

    /// Re-run the snapshot fetch; always safe, never blocked by channel
    /// state.
    pub async fn refresh(&self) -> Result<(), SyncChannelError> {
        self.channels.send_command(SyncCommand::Refresh).await
    }

    /// Send an arbitrary action over the live channel.
    pub async fn send(&self, message: Value) -> Result<(), SyncChannelError> {
        self.channels.send_command(SyncCommand::Send(message)).await
    }

    /// Unsubscribe, leaving the last ranking state frozen for display.
    pub async fn stop(&self) -> Result<(), SyncChannelError> {
        self.channels.send_command(SyncCommand::Stop).await
    }
}

/// Start the reconciler runtime for one competition.
pub fn spawn_reconciler(
    registry: Arc<ChannelRegistry>,
    api: Arc<dyn SnapshotApi>,
    competition_id: u64,
    policy: ReconnectPolicy,
) -> ReconcilerHandle {
    let (channels, command_rx) = SyncChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let runtime = Reconciler {
        channels: channels.clone(),
        registry,
        api,
        competition_id,
        policy,
        state: RankingState::default(),
    };
    tokio::spawn(runtime.run(command_rx));

    ReconcilerHandle { channels }
}

struct Reconciler {
    channels: SyncChannels,
    registry: Arc<ChannelRegistry>,
    api: Arc<dyn SnapshotApi>,
    competition_id: u64,
    policy: ReconnectPolicy,
    state: RankingState,
}

impl Reconciler {
    async fn run(mut self, mut command_rx: mpsc::Receiver<SyncCommand>) {
        let topic = Topic::leaderboard(self.competition_id);
        debug!(competition_id = self.competition_id, topic = %topic, "reconciler starting");

        self.state.loading = true;
        self.emit_state();

        // Fetch results funnel through a channel so refreshes can overlap;
        // the sender half stays alive for the whole run.
        let (fetch_tx, mut fetch_rx) = mpsc::unbounded_channel();
        self.start_fetch(&fetch_tx);

        let (subscription, mut notices) =
            spawn_subscription(Arc::clone(&self.registry), topic.as_str(), self.policy);

        let mut notices_open = true;
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SyncCommand::Refresh) => {
                        debug!(competition_id = self.competition_id, "manual refresh requested");
                        self.start_fetch(&fetch_tx);
                    }
                    Some(SyncCommand::Send(message)) => {
                        if let Err(err) = subscription.send(&message) {
                            warn!(error = %err, "outbound message dropped");
                        }
                    }
                    Some(SyncCommand::Stop) | None => break,
                },
                outcome = fetch_rx.recv() => {
                    if let Some(outcome) = outcome {
                        self.apply_fetch(outcome);
                    }
                }
                notice = notices.recv(), if notices_open => match notice {
                    Some(SubscriptionNotice::Connected) => {
                        self.state.connected = true;
                        self.state.error = None;
                        self.emit_state();
                    }
                    Some(SubscriptionNotice::Disconnected) => {
                        self.state.connected = false;
                        self.emit_state();
                    }
                    Some(SubscriptionNotice::Frame(frame)) => self.apply_frame(frame),
                    None => notices_open = false,
                },
            }
        }

        subscription.unsubscribe();
        debug!(
            competition_id = self.competition_id,
            "reconciler stopped; last ranking state stays frozen"
        );
    }

    fn start_fetch(
        &self,
        fetch_tx: &mpsc::UnboundedSender<Result<Vec<LeaderboardEntry>, SyncError>>,
    ) {
        let api = Arc::clone(&self.api);
        let competition_id = self.competition_id;
        let fetch_tx = fetch_tx.clone();
        tokio::spawn(async move {
            let outcome = fetch_snapshot(api.as_ref(), competition_id).await;
            let _ = fetch_tx.send(outcome);
        });
    }

    fn apply_fetch(&mut self, outcome: Result<Vec<LeaderboardEntry>, SyncError>) {
        match outcome {
            Ok(entries) => {
                self.state.entries = entries;
                self.state.error = None;
            }
            Err(err) => {
                warn!(
                    competition_id = self.competition_id,
                    error = %err,
                    "snapshot fetch failed"
                );
                self.state.entries = Vec::new();
                self.state.error = Some(err);
            }
        }
        self.state.loading = false;
        self.emit_state();
    }

    fn apply_frame(&mut self, frame: StreamFrame) {
        match normalize::frame_entries(&frame) {
            Some(entries) => {
                // Last write wins: every recognized frame is a complete
                // replacement of the visible ranking, never a patch.
                self.state.entries = entries;
                self.emit_state();
            }
            None => {
                trace!(kind = %frame.kind, "passing frame through");
                self.channels.emit(SyncEvent::Frame(frame));
            }
        }
    }

    fn emit_state(&self) {
        self.channels.emit(SyncEvent::RankingChanged(self.state.clone()));
    }
}
