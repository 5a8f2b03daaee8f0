//! Mock implementations for testing
//!
//! [`MockTransport`] stands in for the MQTT client. Connect and reconnect
//! outcomes are scripted, publishes and subscriptions are recorded, and tests
//! can inject transport events (for example a dropped session) directly.

use crate::transport::{ConnectResult, PublishStatus, Transport, TransportEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

pub type PublishedMessage = (String, Vec<u8>);

/// Error returned by [`MockTransport`] operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("mock transport: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport for testing
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    connect_failure: Mutex<Option<String>>,
    reconnect_script: Mutex<VecDeque<bool>>,
    reconnect_calls: AtomicUsize,
    reconnect_times: Mutex<Vec<Instant>>,
    publish_status: Mutex<PublishStatus>,
    publish_calls: AtomicUsize,
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    subscriptions: Mutex<Vec<String>>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            connected: AtomicBool::new(false),
            connect_failure: Mutex::new(None),
            reconnect_script: Mutex::new(VecDeque::new()),
            reconnect_calls: AtomicUsize::new(0),
            reconnect_times: Mutex::new(Vec::new()),
            publish_status: Mutex::new(PublishStatus::Queued),
            publish_calls: AtomicUsize::new(0),
            published: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that is already live, for publication tests
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.set_connected(true);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    /// Make the next `connect` call fail
    pub async fn fail_next_connect(&self, reason: &str) {
        *self.connect_failure.lock().await = Some(reason.to_string());
    }

    /// Queue reconnect outcomes (`true` = success). Unscripted calls fail.
    pub async fn script_reconnects(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.reconnect_script.lock().await.extend(outcomes);
    }

    /// Status returned by `publish` while connected
    pub async fn set_publish_status(&self, status: PublishStatus) {
        *self.publish_status.lock().await = status;
    }

    /// Simulate the broker dropping the session
    pub async fn drop_connection(&self, reason: &str) {
        self.set_connected(false);
        self.emit(TransportEvent::Disconnected(reason.to_string()))
            .await;
    }

    /// Inject a transport event
    pub async fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event).await;
    }

    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::Acquire)
    }

    /// Instants at which `reconnect` was called
    pub async fn reconnect_times(&self) -> Vec<Instant> {
        self.reconnect_times.lock().await.clone()
    }

    /// Calls to `publish`, including ones that returned `NoConnection`
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::Acquire)
    }

    /// Messages accepted while connected
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    fn emit_nowait(&self, event: TransportEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&self) -> Result<(), Self::Error> {
        if let Some(reason) = self.connect_failure.lock().await.take() {
            return Err(MockTransportError(reason));
        }
        self.set_connected(true);
        self.emit_nowait(TransportEvent::Connected(ConnectResult::Accepted));
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), Self::Error> {
        self.reconnect_calls.fetch_add(1, Ordering::AcqRel);
        self.reconnect_times.lock().await.push(Instant::now());

        let succeed = self
            .reconnect_script
            .lock()
            .await
            .pop_front()
            .unwrap_or(false);
        if succeed {
            self.set_connected(true);
            self.emit_nowait(TransportEvent::Connected(ConnectResult::Accepted));
            Ok(())
        } else {
            Err(MockTransportError("connection refused".to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<PublishStatus, Self::Error> {
        self.publish_calls.fetch_add(1, Ordering::AcqRel);
        if !self.is_connected() {
            return Ok(PublishStatus::NoConnection);
        }

        let status = *self.publish_status.lock().await;
        if status.is_success() {
            self.published
                .lock()
                .await
                .push((topic.to_string(), payload));
        }
        Ok(status)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), Self::Error> {
        self.subscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().await.take()
    }
}
