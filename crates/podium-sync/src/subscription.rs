//! Per-consumer subscription lifecycle.
//!
//! A subscription binds one consumer to one topic: it opens the channel
//! through the shared registry, relays dispatch, and drives the reconnect
//! state machine. A cancellation token is checked before every notice so
//! nothing fires after an explicit unsubscribe.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use podium_core::{
    ReconnectPolicy, StreamFrame, SubscriptionPhase, SubscriptionStateMachine, SyncError,
};

use crate::registry::{ChannelEvent, ChannelRegistry};

/// Connectivity and dispatch notices delivered to the subscribing consumer,
/// in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionNotice {
    Connected,
    Disconnected,
    Frame(StreamFrame),
}

/// Consumer handle for one subscription.
pub struct SubscriptionHandle {
    topic: String,
    registry: Arc<ChannelRegistry>,
    machine: Arc<Mutex<SubscriptionStateMachine>>,
    liveness: CancellationToken,
    instance: Uuid,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn phase(&self) -> SubscriptionPhase {
        lock_machine(&self.machine).phase()
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == SubscriptionPhase::Connected
    }

    /// Send an arbitrary action over the live channel.
    ///
    /// Outside `Connected` this is a logged local failure; nothing is
    /// queued for later delivery.
    pub fn send(&self, message: &Value) -> Result<(), SyncError> {
        if !lock_machine(&self.machine).can_send() {
            warn!(
                topic = %self.topic,
                subscription = %self.instance,
                "send while not connected; message dropped"
            );
            return Err(SyncError::not_connected(&self.topic));
        }
        self.registry.send(&self.topic, message)
    }

    /// Tear the subscription down.
    ///
    /// Cancels any pending reconnect timer and closes the topic through the
    /// registry. No notice is delivered after this returns.
    pub fn unsubscribe(&self) {
        debug!(
            topic = %self.topic,
            subscription = %self.instance,
            "unsubscribing"
        );
        self.liveness.cancel();
        lock_machine(&self.machine).terminate();
        self.registry.close(&self.topic);
    }
}

/// Start a subscription for `topic` and return its handle plus the notice
/// stream.
pub fn spawn_subscription(
    registry: Arc<ChannelRegistry>,
    topic: &str,
    policy: ReconnectPolicy,
) -> (
    SubscriptionHandle,
    mpsc::UnboundedReceiver<SubscriptionNotice>,
) {
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let machine = Arc::new(Mutex::new(SubscriptionStateMachine::default()));
    let liveness = CancellationToken::new();
    let instance = Uuid::new_v4();

    // Infallible from Idle; done before the task starts so the handle never
    // observes Idle.
    let _ = lock_machine(&machine).subscribe();

    let handle = SubscriptionHandle {
        topic: topic.to_owned(),
        registry: Arc::clone(&registry),
        machine: Arc::clone(&machine),
        liveness: liveness.clone(),
        instance,
    };

    debug!(topic = %topic, subscription = %instance, "subscription starting");
    let task_topic = topic.to_owned();
    tokio::spawn(async move {
        run_subscription(
            registry, task_topic, policy, machine, liveness, notice_tx, instance,
        )
        .await;
    });

    (handle, notice_rx)
}

async fn run_subscription(
    registry: Arc<ChannelRegistry>,
    topic: String,
    policy: ReconnectPolicy,
    machine: Arc<Mutex<SubscriptionStateMachine>>,
    liveness: CancellationToken,
    notice_tx: mpsc::UnboundedSender<SubscriptionNotice>,
    instance: Uuid,
) {
    loop {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let _channel = registry.open(&topic, event_tx);

        loop {
            let event = tokio::select! {
                _ = liveness.cancelled() => return,
                event = event_rx.recv() => event,
            };

            if liveness.is_cancelled() {
                return;
            }

            match event {
                Some(ChannelEvent::Opened) => {
                    if lock_machine(&machine).on_remote_open().is_ok() {
                        debug!(topic = %topic, subscription = %instance, "subscription connected");
                        let _ = notice_tx.send(SubscriptionNotice::Connected);
                    }
                }
                Some(ChannelEvent::Frame(frame)) => {
                    trace!(
                        topic = %topic,
                        subscription = %instance,
                        kind = %frame.kind,
                        "dispatching frame"
                    );
                    let _ = notice_tx.send(SubscriptionNotice::Frame(frame));
                }
                Some(ChannelEvent::TransportError(err)) => {
                    debug!(
                        topic = %topic,
                        subscription = %instance,
                        error = %err,
                        "transport error on channel"
                    );
                }
                Some(ChannelEvent::Closed) | None => break,
            }
        }

        if liveness.is_cancelled() {
            return;
        }
        if lock_machine(&machine).on_remote_close().is_ok() {
            debug!(topic = %topic, subscription = %instance, "subscription disconnected");
            let _ = notice_tx.send(SubscriptionNotice::Disconnected);
        }

        let Some(delay) = policy.delay() else {
            debug!(
                topic = %topic,
                subscription = %instance,
                "reconnect disabled; staying disconnected"
            );
            return;
        };

        debug!(
            topic = %topic,
            subscription = %instance,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = liveness.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        if lock_machine(&machine).on_timer_elapsed().is_err() {
            return;
        }
    }
}

fn lock_machine(
    machine: &Mutex<SubscriptionStateMachine>,
) -> MutexGuard<'_, SubscriptionStateMachine> {
    match machine.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
