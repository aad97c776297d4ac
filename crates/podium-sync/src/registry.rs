//! Process-wide channel registry.
//!
//! One registry instance is constructed at application start and shared by
//! every subscription; it owns the topic → channel map and guarantees at
//! most one live connection per topic no matter how many consumers ask.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use podium_core::{ChannelState, StreamFrame, SyncError, normalize};

use crate::transport::Connector;

/// Lifecycle and dispatch events delivered to the channel opener.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The underlying connection finished its handshake.
    Opened,
    /// One inbound frame, in transport delivery order.
    Frame(StreamFrame),
    /// The transport reported an error; a close follows.
    TransportError(SyncError),
    /// The connection ended, or the connect attempt failed.
    Closed,
}

enum ChannelCmd {
    Send(String),
    Close,
}

/// Consumer-facing handle for one live channel.
///
/// The registry is the sole owner of channel lifetimes; handles only relay
/// sends and state reads.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    topic: String,
    state: Arc<Mutex<ChannelState>>,
    cmd_tx: mpsc::UnboundedSender<ChannelCmd>,
}

impl ChannelHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> ChannelState {
        *lock_unpoisoned(&self.state)
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    fn set_state(&self, next: ChannelState) {
        *lock_unpoisoned(&self.state) = next;
    }
}

/// Process-wide topic → channel map.
pub struct ChannelRegistry {
    stream_base: Url,
    connector: Arc<dyn Connector>,
    channels: Mutex<HashMap<String, ChannelHandle>>,
}

impl ChannelRegistry {
    pub fn new(stream_base: Url, connector: Arc<dyn Connector>) -> Self {
        Self {
            stream_base,
            connector,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Open the channel for `topic`, reusing a non-closed one when present.
    ///
    /// On reuse the supplied event sender is dropped: dispatch keeps flowing
    /// to the original opener, and a warning records the duplicate request.
    pub fn open(
        &self,
        topic: &str,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> ChannelHandle {
        let mut channels = lock_unpoisoned(&self.channels);

        if let Some(existing) = channels.get(topic)
            && existing.state() != ChannelState::Closed
        {
            warn!(%topic, "channel already exists for topic; reusing it");
            return existing.clone();
        }

        let url = channel_url(&self.stream_base, topic);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = ChannelHandle {
            topic: topic.to_owned(),
            state: Arc::new(Mutex::new(ChannelState::Connecting)),
            cmd_tx,
        };
        channels.insert(topic.to_owned(), handle.clone());

        debug!(%topic, %url, "opening channel");
        let connector = Arc::clone(&self.connector);
        let task_handle = handle.clone();
        tokio::spawn(async move {
            run_channel(connector, url, task_handle, cmd_rx, events).await;
        });

        handle
    }

    /// Serialize and transmit `message`, only while the channel is open.
    ///
    /// There is no queuing and no retry; the caller re-sends after
    /// reconnection if it cares.
    pub fn send(&self, topic: &str, message: &Value) -> Result<(), SyncError> {
        let channels = lock_unpoisoned(&self.channels);

        let Some(handle) = channels.get(topic) else {
            warn!(%topic, "send on unknown topic; message dropped");
            return Err(SyncError::not_connected(topic));
        };
        if !handle.is_open() {
            warn!(%topic, "send while channel is not open; message dropped");
            return Err(SyncError::not_connected(topic));
        }

        handle
            .cmd_tx
            .send(ChannelCmd::Send(message.to_string()))
            .map_err(|_| SyncError::not_connected(topic))
    }

    /// Shut the channel for `topic` down.
    ///
    /// The entry is removed from the map immediately rather than on the
    /// close event, so an `open` right after a `close` deterministically
    /// constructs a fresh connection.
    pub fn close(&self, topic: &str) {
        let removed = lock_unpoisoned(&self.channels).remove(topic);
        if let Some(handle) = removed {
            debug!(%topic, "closing channel");
            let _ = handle.cmd_tx.send(ChannelCmd::Close);
        }
    }

    /// Shut every tracked channel down; used only at process teardown.
    pub fn close_all(&self) {
        let drained: Vec<(String, ChannelHandle)> =
            lock_unpoisoned(&self.channels).drain().collect();
        for (topic, handle) in drained {
            debug!(%topic, "closing channel at teardown");
            let _ = handle.cmd_tx.send(ChannelCmd::Close);
        }
    }

    pub fn is_open(&self, topic: &str) -> bool {
        lock_unpoisoned(&self.channels)
            .get(topic)
            .is_some_and(ChannelHandle::is_open)
    }
}

fn channel_url(stream_base: &Url, topic: &str) -> String {
    format!("{}/{topic}/", stream_base.as_str().trim_end_matches('/'))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run_channel(
    connector: Arc<dyn Connector>,
    url: String,
    handle: ChannelHandle,
    mut cmd_rx: mpsc::UnboundedReceiver<ChannelCmd>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut transport = match connector.connect(&url).await {
        Ok(transport) => transport,
        Err(err) => {
            warn!(topic = %handle.topic, error = %err, "channel connect failed");
            handle.set_state(ChannelState::Closed);
            let _ = events.send(ChannelEvent::TransportError(err));
            let _ = events.send(ChannelEvent::Closed);
            return;
        }
    };

    handle.set_state(ChannelState::Open);
    debug!(topic = %handle.topic, "channel open");
    let _ = events.send(ChannelEvent::Opened);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ChannelCmd::Send(text)) => {
                    if let Err(err) = transport.send_text(text).await {
                        warn!(topic = %handle.topic, error = %err, "outbound send failed");
                        let _ = events.send(ChannelEvent::TransportError(err));
                        break;
                    }
                }
                Some(ChannelCmd::Close) | None => {
                    transport.close().await;
                    break;
                }
            },
            inbound = transport.next_text() => match inbound {
                Some(Ok(text)) => match normalize::parse_frame(&text) {
                    Some(frame) => {
                        let _ = events.send(ChannelEvent::Frame(frame));
                    }
                    None => debug!(topic = %handle.topic, "dropping malformed frame"),
                },
                Some(Err(err)) => {
                    warn!(topic = %handle.topic, error = %err, "transport error");
                    let _ = events.send(ChannelEvent::TransportError(err));
                    break;
                }
                None => break,
            },
        }
    }

    handle.set_state(ChannelState::Closed);
    debug!(topic = %handle.topic, "channel closed");
    let _ = events.send(ChannelEvent::Closed);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;
    use crate::testing::MockConnector;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    fn registry_with(connector: &Arc<MockConnector>) -> ChannelRegistry {
        let base = Url::parse("ws://localhost:8000/ws").expect("base url must parse");
        ChannelRegistry::new(base, Arc::clone(connector) as Arc<dyn Connector>)
    }

    async fn await_event(
        rx: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> ChannelEvent {
        timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("event timeout")
            .expect("event channel should stay open")
    }

    #[tokio::test]
    async fn distinct_topics_get_independent_channels() {
        let connector = MockConnector::new();
        let _session_a = connector.queue_session();
        let _session_b = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.open("leaderboard/1", tx_a);
        registry.open("leaderboard/2", tx_b);

        assert_eq!(await_event(&mut rx_a).await, ChannelEvent::Opened);
        assert_eq!(await_event(&mut rx_b).await, ChannelEvent::Opened);
        assert_eq!(connector.connect_calls(), 2);

        registry.close("leaderboard/1");
        assert_eq!(
            await_event(&mut rx_a).await,
            ChannelEvent::Closed,
            "closed topic must report close"
        );
        assert!(registry.is_open("leaderboard/2"));
        assert!(!registry.is_open("leaderboard/1"));
    }

    #[tokio::test]
    async fn reopening_a_live_topic_reuses_the_connection() {
        let connector = MockConnector::new();
        let _session = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx_first, mut rx_first) = mpsc::unbounded_channel();
        let first = registry.open("leaderboard/5", tx_first);
        assert_eq!(await_event(&mut rx_first).await, ChannelEvent::Opened);

        let (tx_second, mut rx_second) = mpsc::unbounded_channel();
        let second = registry.open("leaderboard/5", tx_second);

        assert_eq!(connector.connect_calls(), 1);
        assert!(Arc::ptr_eq(&first.state, &second.state));
        assert!(
            timeout(Duration::from_millis(100), rx_second.recv())
                .await
                .is_err(),
            "second opener's events must stay unwired"
        );
    }

    #[tokio::test]
    async fn close_then_open_constructs_a_fresh_connection() {
        let connector = MockConnector::new();
        let _first = connector.queue_session();
        let _second = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        registry.close("leaderboard/5");

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx2);
        assert_eq!(await_event(&mut rx2).await, ChannelEvent::Opened);
        assert_eq!(connector.connect_calls(), 2);
    }

    #[tokio::test]
    async fn dispatches_frames_in_delivery_order() {
        let connector = MockConnector::new();
        let session = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        session.push_text(json!({"type": "leaderboard_init", "data": {"entries": []}}).to_string());
        session.push_text(json!({"type": "participant_joined", "data": {}}).to_string());

        match await_event(&mut rx).await {
            ChannelEvent::Frame(frame) => assert_eq!(frame.kind, "leaderboard_init"),
            other => panic!("unexpected event: {other:?}"),
        }
        match await_event(&mut rx).await {
            ChannelEvent::Frame(frame) => assert_eq!(frame.kind, "participant_joined"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn drops_malformed_frames_without_closing() {
        let connector = MockConnector::new();
        let session = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        session.push_text("{not json".to_owned());
        session.push_text(json!({"type": "pong"}).to_string());

        match await_event(&mut rx).await {
            ChannelEvent::Frame(frame) => assert_eq!(frame.kind, "pong"),
            other => panic!("malformed frame must be skipped, got {other:?}"),
        }
        assert!(registry.is_open("leaderboard/5"));
    }

    #[tokio::test]
    async fn send_requires_an_open_channel() {
        let connector = MockConnector::new();
        let mut session = connector.queue_session();
        let registry = registry_with(&connector);

        let err = registry
            .send("leaderboard/5", &json!({"action": "refresh"}))
            .expect_err("send before open must fail");
        assert_eq!(err.code, "send_not_connected");

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        registry
            .send("leaderboard/5", &json!({"action": "refresh"}))
            .expect("send on open channel must work");
        let sent = session.next_sent().await.expect("message should reach transport");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&sent).expect("sent text is json"),
            json!({"action": "refresh"})
        );
    }

    #[tokio::test]
    async fn failed_connect_reports_error_then_close() {
        let connector = MockConnector::new();
        // No queued session: connect fails.
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/9", tx);

        match await_event(&mut rx).await {
            ChannelEvent::TransportError(err) => assert_eq!(err.code, "connect_failed"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Closed);
        assert!(!registry.is_open("leaderboard/9"));
    }

    #[tokio::test]
    async fn transport_error_reports_then_closes() {
        let connector = MockConnector::new();
        let session = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        session.push_error(podium_core::SyncError::new(
            podium_core::SyncErrorCategory::Network,
            "transport_error",
            "connection reset",
        ));

        match await_event(&mut rx).await {
            ChannelEvent::TransportError(err) => assert_eq!(err.code, "transport_error"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Closed);
        assert!(!registry.is_open("leaderboard/5"));
    }

    #[tokio::test]
    async fn remote_close_marks_channel_closed() {
        let connector = MockConnector::new();
        let session = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.open("leaderboard/5", tx);
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Opened);

        session.close_remote();
        assert_eq!(await_event(&mut rx).await, ChannelEvent::Closed);
        assert!(!registry.is_open("leaderboard/5"));
    }

    #[tokio::test]
    async fn close_all_shuts_every_channel() {
        let connector = MockConnector::new();
        let _a = connector.queue_session();
        let _b = connector.queue_session();
        let registry = registry_with(&connector);

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.open("leaderboard/1", tx_a);
        registry.open("leaderboard/2", tx_b);
        assert_eq!(await_event(&mut rx_a).await, ChannelEvent::Opened);
        assert_eq!(await_event(&mut rx_b).await, ChannelEvent::Opened);

        registry.close_all();
        assert_eq!(await_event(&mut rx_a).await, ChannelEvent::Closed);
        assert_eq!(await_event(&mut rx_b).await, ChannelEvent::Closed);
        assert!(!registry.is_open("leaderboard/1"));
        assert!(!registry.is_open("leaderboard/2"));
    }

    #[test]
    fn builds_channel_urls_under_the_stream_base() {
        let base = Url::parse("ws://localhost:8000/ws/").expect("url");
        assert_eq!(
            channel_url(&base, "leaderboard/5"),
            "ws://localhost:8000/ws/leaderboard/5/"
        );

        let no_slash = Url::parse("ws://localhost:8000/ws").expect("url");
        assert_eq!(
            channel_url(&no_slash, "leaderboard/5"),
            "ws://localhost:8000/ws/leaderboard/5/"
        );
    }
}
