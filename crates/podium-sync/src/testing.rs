//! Scripted connector/transport/API doubles shared by the crate's tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use podium_core::{SyncError, SyncErrorCategory};

use crate::{
    fetch::SnapshotApi,
    transport::{Connector, Transport},
};

enum ScriptedItem {
    Text(String),
    Error(SyncError),
    Close,
}

/// Test-side controls for one scripted transport session.
pub struct MockSession {
    inbound_tx: mpsc::UnboundedSender<ScriptedItem>,
    sent_rx: mpsc::UnboundedReceiver<String>,
}

impl MockSession {
    /// Deliver one inbound text frame to the channel task.
    pub fn push_text(&self, text: String) {
        let _ = self.inbound_tx.send(ScriptedItem::Text(text));
    }

    /// Deliver one inbound transport error.
    pub fn push_error(&self, err: SyncError) {
        let _ = self.inbound_tx.send(ScriptedItem::Error(err));
    }

    /// Simulate a remote close of the connection.
    pub fn close_remote(&self) {
        let _ = self.inbound_tx.send(ScriptedItem::Close);
    }

    /// Next outbound message the channel task wrote to the transport.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent_rx.recv().await
    }
}

struct SessionSlots {
    inbound_rx: mpsc::UnboundedReceiver<ScriptedItem>,
    sent_tx: mpsc::UnboundedSender<String>,
}

/// Connector double that counts calls and hands out scripted sessions in
/// queue order; connecting with no session queued fails like a dead server.
pub struct MockConnector {
    connect_calls: AtomicUsize,
    sessions: Mutex<VecDeque<SessionSlots>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_calls: AtomicUsize::new(0),
            sessions: Mutex::new(VecDeque::new()),
        })
    }

    /// Queue a session for the next connect call and return its controls.
    pub fn queue_session(&self) -> MockSession {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        self.lock_sessions().push_back(SessionSlots {
            inbound_rx,
            sent_tx,
        });

        MockSession {
            inbound_tx,
            sent_rx,
        }
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, VecDeque<SessionSlots>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, SyncError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        match self.lock_sessions().pop_front() {
            Some(slots) => Ok(Box::new(MockTransport {
                inbound: slots.inbound_rx,
                sent: slots.sent_tx,
            })),
            None => Err(SyncError::new(
                SyncErrorCategory::Network,
                "connect_failed",
                "no scripted session available",
            )),
        }
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<ScriptedItem>,
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.sent.send(text).map_err(|_| {
            SyncError::new(
                SyncErrorCategory::Network,
                "transport_error",
                "scripted transport dropped",
            )
        })
    }

    async fn next_text(&mut self) -> Option<Result<String, SyncError>> {
        match self.inbound.recv().await {
            Some(ScriptedItem::Text(text)) => Some(Ok(text)),
            Some(ScriptedItem::Error(err)) => Some(Err(err)),
            Some(ScriptedItem::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Snapshot API double replaying queued responses; an empty queue behaves
/// like a request that never returns.
pub struct MockSnapshotApi {
    responses: Mutex<VecDeque<Result<Value, SyncError>>>,
}

impl MockSnapshotApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
        })
    }

    pub fn queue_ok(&self, payload: Value) {
        self.lock_responses().push_back(Ok(payload));
    }

    pub fn queue_err(&self, err: SyncError) {
        self.lock_responses().push_back(Err(err));
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<Value, SyncError>>> {
        match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SnapshotApi for MockSnapshotApi {
    async fn fetch_raw(&self, _competition_id: u64) -> Result<Value, SyncError> {
        let next = self.lock_responses().pop_front();
        match next {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}
