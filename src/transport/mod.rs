//! Transport layer for broker communication
//!
//! This module provides the transport abstraction the connection manager and
//! publication loop are written against, and its MQTT implementation.
//!
//! Event callbacks are modelled as a channel: the transport pushes
//! [`TransportEvent`]s from its own I/O task and the connection manager
//! consumes them on another.

use bytes::Bytes;
use tokio::sync::mpsc;

pub mod mqtt;

/// Outcome of a broker handshake as reported to the connect handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectResult {
    /// Broker accepted the session
    Accepted,
    /// Broker refused or the handshake failed; carries the reason code
    Refused(String),
}

impl ConnectResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ConnectResult::Accepted)
    }
}

/// Events emitted by a transport's I/O task
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A handshake completed (initial connect or reconnect)
    Connected(ConnectResult),
    /// A live session dropped, gracefully or not
    Disconnected(String),
    /// A message arrived on a subscribed topic
    Message { topic: String, payload: Bytes },
}

/// Result of handing a message to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Accepted into the outgoing queue
    Queued,
    /// Outgoing queue full; message dropped
    QueueFull,
    /// No live session; message dropped
    NoConnection,
}

impl PublishStatus {
    pub fn is_success(self) -> bool {
        matches!(self, PublishStatus::Queued)
    }
}

/// Transport trait for broker communication
///
/// All methods take `&self` so one transport can be shared (behind an `Arc`)
/// between the connection manager, its reconnect task and the publication loop.
/// Implementations must make `is_connected`, `publish` and `reconnect` safe to
/// call concurrently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the session and wait for the broker's acknowledgement
    async fn connect(&self) -> Result<(), Self::Error>;

    /// Re-open a dropped session reusing the original identity and credentials
    async fn reconnect(&self) -> Result<(), Self::Error>;

    /// Point-in-time liveness; never blocks
    fn is_connected(&self) -> bool;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<PublishStatus, Self::Error>;

    /// Subscribe to a topic
    async fn subscribe(&self, topic: &str) -> Result<(), Self::Error>;

    /// Take the event stream; returns `None` once it has been taken
    async fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>>;
}

/// Type alias for MQTT transport
pub type MqttTransport = mqtt::MqttClient;
