//! Impure I/O operations for MQTT client
//!
//! [`MqttClient`] owns the rumqttc [`AsyncClient`] and hands its
//! [`EventLoop`] to a driver task on [`connect`](MqttClient::connect). The
//! driver polls the event loop while the session is live. When the session
//! drops it reports [`TransportEvent::Disconnected`] and parks: it stops
//! polling, so rumqttc never reconnects on its own, and waits for a
//! reconnect command. Reconnect pacing is owned by the connection manager.

use super::connection::{configure_mqtt_options, MqttError, SessionOptions};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::PublisherConfig;
use crate::transport::{ConnectResult, PublishStatus, Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, ClientError, ConnectionError, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of rumqttc's request channel
const REQUEST_CHANNEL_CAPACITY: usize = 10;
/// Capacity of the transport event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;
/// How long `disconnect` waits for the DISCONNECT packet to go out
const DISCONNECT_GRACE: Duration = Duration::from_millis(500);

/// Commands sent from the client handle to the driver task
enum DriverCommand {
    Reconnect(oneshot::Sender<Result<(), MqttError>>),
}

/// MQTT transport client for the telemetry publisher
pub struct MqttClient {
    session: SessionOptions,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    connected: Arc<AtomicBool>,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    commands_tx: Mutex<Option<mpsc::Sender<DriverCommand>>>,
    driver_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MqttClient {
    pub fn new(config: &PublisherConfig) -> Result<Self, MqttError> {
        let session = SessionOptions::from_config(config)?;
        Self::with_session(session)
    }

    pub fn with_session(session: SessionOptions) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(&session)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(MqttClient {
            session,
            client,
            event_loop: Mutex::new(Some(event_loop)),
            connected: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            commands_tx: Mutex::new(None),
            driver_handle: Mutex::new(None),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.session.client_id
    }

    pub fn session(&self) -> &SessionOptions {
        &self.session
    }

    /// Send DISCONNECT and stop the driver task
    ///
    /// Stop the connection manager first, or it will see the drop and start
    /// a reconnect episode.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        if self.is_connected() {
            if let Err(e) = self.client.disconnect().await {
                warn!("Failed to send disconnect: {}", e);
            }
            // The driver marks the session down once the DISCONNECT is flushed
            let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
                while self.is_connected() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            if flushed.is_err() {
                debug!("DISCONNECT not confirmed within {:?}", DISCONNECT_GRACE);
            }
        }

        self.commands_tx.lock().await.take();
        if let Some(handle) = self.driver_handle.lock().await.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::Release);
        info!(client_id = %self.session.client_id, "MQTT client disconnected");
        Ok(())
    }

    async fn command_sender(&self) -> Result<mpsc::Sender<DriverCommand>, MqttError> {
        self.commands_tx
            .lock()
            .await
            .clone()
            .ok_or(MqttError::NotConnected)
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    /// Start the driver and wait for the first CONNACK
    ///
    /// A failure here is terminal for this client: the driver exits and
    /// later `reconnect` calls return [`MqttError::EventLoopClosed`].
    async fn connect(&self) -> Result<(), MqttError> {
        let event_loop = self
            .event_loop
            .lock()
            .await
            .take()
            .ok_or(MqttError::AlreadyStarted)?;

        let (commands_tx, commands_rx) = mpsc::channel(1);
        let (first_tx, first_rx) = oneshot::channel();

        let driver = EventLoopDriver {
            client_id: self.session.client_id.clone(),
            event_loop,
            events_tx: self.events_tx.clone(),
            commands_rx,
            connected: self.connected.clone(),
            handshake_timeout: self.session.connect_timeout,
        };

        info!(
            client_id = %self.session.client_id,
            host = %self.session.address.host,
            port = self.session.address.port,
            tls = self.session.address.use_tls,
            "Connecting to MQTT broker"
        );

        *self.commands_tx.lock().await = Some(commands_tx);
        *self.driver_handle.lock().await = Some(tokio::spawn(driver.run(first_tx)));

        first_rx.await.map_err(|_| MqttError::EventLoopClosed)?
    }

    async fn reconnect(&self) -> Result<(), MqttError> {
        let commands = self.command_sender().await?;
        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(DriverCommand::Reconnect(reply_tx))
            .await
            .map_err(|_| MqttError::EventLoopClosed)?;
        reply_rx.await.map_err(|_| MqttError::EventLoopClosed)?
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<PublishStatus, MqttError> {
        if !self.is_connected() {
            return Ok(PublishStatus::NoConnection);
        }

        match self
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
        {
            Ok(()) => Ok(PublishStatus::Queued),
            Err(ClientError::TryRequest(_)) => Ok(PublishStatus::QueueFull),
            Err(e) => Err(MqttError::PublishFailed(Box::new(e))),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;
        debug!("Subscription request queued for {}", topic);
        Ok(())
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.lock().await.take()
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        if let Some(handle) = self.driver_handle.get_mut().take() {
            handle.abort();
        }
    }
}

/// Owns the event loop for the lifetime of the client
struct EventLoopDriver {
    client_id: String,
    event_loop: EventLoop,
    events_tx: mpsc::Sender<TransportEvent>,
    commands_rx: mpsc::Receiver<DriverCommand>,
    connected: Arc<AtomicBool>,
    handshake_timeout: Duration,
}

impl EventLoopDriver {
    async fn run(mut self, first: oneshot::Sender<Result<(), MqttError>>) {
        let result = self.handshake().await;
        let accepted = result.is_ok();
        let _ = first.send(result);
        if !accepted {
            debug!(client_id = %self.client_id, "Initial handshake failed, driver exiting");
            return;
        }

        loop {
            let Some(reason) = self.pump().await else {
                break;
            };
            self.mark_down(reason).await;

            if !self.park().await {
                break;
            }
        }
        self.connected.store(false, Ordering::Release);
        debug!(client_id = %self.client_id, "MQTT driver stopped");
    }

    /// Poll until the broker answers the handshake
    async fn handshake(&mut self) -> Result<(), MqttError> {
        let timeout = self.handshake_timeout;
        let outcome = tokio::time::timeout(timeout, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged(result) => return Ok(result),
                        other => debug!("Event before CONNACK: {:?}", other),
                    },
                    Err(ConnectionError::ConnectionRefused(code)) => {
                        return Ok(MessageHandler::connect_result(&code));
                    }
                    Err(e) => return Err(MqttError::ConnectionFailed(Box::new(e))),
                }
            }
        })
        .await
        .unwrap_or(Err(MqttError::ConnectTimeout {
            timeout_secs: timeout.as_secs(),
        }));

        match outcome {
            Ok(ConnectResult::Accepted) => {
                self.connected.store(true, Ordering::Release);
                self.emit(TransportEvent::Connected(ConnectResult::Accepted))
                    .await;
                Ok(())
            }
            Ok(ConnectResult::Refused(code)) => {
                self.emit(TransportEvent::Connected(ConnectResult::Refused(
                    code.clone(),
                )))
                .await;
                Err(MqttError::ConnectionRefused(code))
            }
            Err(e) => Err(e),
        }
    }

    /// Drive a live session. Returns the drop reason, or `None` when the
    /// client handle is gone.
    async fn pump(&mut self) -> Option<String> {
        loop {
            tokio::select! {
                polled = self.event_loop.poll() => match polled {
                    Ok(event) => {
                        if let Some(reason) = self.dispatch(event).await {
                            return Some(reason);
                        }
                    }
                    Err(e) => return Some(e.to_string()),
                },
                command = self.commands_rx.recv() => match command {
                    // Already live; nothing to do
                    Some(DriverCommand::Reconnect(reply)) => {
                        let _ = reply.send(Ok(()));
                    }
                    None => return None,
                },
            }
        }
    }

    /// Wait for reconnect commands until one succeeds. Returns `false` when
    /// the client handle is gone.
    async fn park(&mut self) -> bool {
        while let Some(DriverCommand::Reconnect(reply)) = self.commands_rx.recv().await {
            let result = self.handshake().await;
            let accepted = result.is_ok();
            let _ = reply.send(result);
            if accepted {
                return true;
            }
        }
        false
    }

    async fn dispatch(&mut self, event: rumqttc::v5::Event) -> Option<String> {
        match MessageHandler::route_mqtt_event(&event) {
            EventRoute::MessageReceived { topic, payload } => {
                self.emit(TransportEvent::Message { topic, payload }).await;
            }
            EventRoute::Disconnected(reason) => return Some(reason),
            EventRoute::SubscriptionConfirmed {
                packet_id,
                reason_codes,
            } => {
                debug!(packet_id, ?reason_codes, "Subscription acknowledged");
            }
            EventRoute::ConnectionAcknowledged(result) => {
                debug!("Unexpected CONNACK on live session: {:?}", result);
            }
            EventRoute::InfrastructureEvent(event) => debug!("MQTT event: {}", event),
            EventRoute::OutgoingEvent => {}
        }
        None
    }

    async fn mark_down(&mut self, reason: String) {
        self.connected.store(false, Ordering::Release);
        self.emit(TransportEvent::Disconnected(reason)).await;
    }

    async fn emit(&mut self, event: TransportEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Transport event receiver dropped");
        }
    }
}
