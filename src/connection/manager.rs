//! Connection manager: session lifecycle and the reconnect protocol
//!
//! The manager consumes [`TransportEvent`]s on a supervisor task and reacts:
//!
//! - `Connected` - subscribe to the configured topic and mark the link live
//! - `Disconnected` - start a reconnect episode on its own task
//! - `Message` - log it
//!
//! A reconnect episode sleeps, calls [`Transport::reconnect`] and repeats on
//! the [`ReconnectPolicy`] schedule until it succeeds or runs out of attempts.
//! An exhausted episode raises the [`ExitFlag`].

use super::backoff::{ReconnectPolicy, ReconnectState, ReconnectionDecision};
use crate::exit_flag::ExitFlag;
use crate::reconnect_span;
use crate::transport::{ConnectResult, Transport, TransportEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// The manager's view of the broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Initial handshake in progress
    Connecting,
    /// Session established and subscribed
    Live,
    /// Session dropped with reason
    Disconnected(String),
    /// Reconnect episode waiting on or making attempt `attempt`
    Retrying { attempt: u32 },
    /// Reconnect episode gave up
    Exhausted { attempts: u32 },
}

impl LinkState {
    pub fn is_live(&self) -> bool {
        matches!(self, LinkState::Live)
    }
}

/// How a reconnect episode ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeOutcome {
    /// Attempt number `attempt` succeeded
    Reconnected { attempt: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32 },
}

/// Record of one reconnect episode
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    pub outcome: EpisodeOutcome,
    /// Delays waited before each attempt, in order
    pub delays: Vec<Duration>,
}

impl EpisodeReport {
    pub fn attempts(&self) -> usize {
        self.delays.len()
    }
}

/// Log connection state transition
pub fn log_state_transition(from: &LinkState, to: &LinkState) {
    match (from, to) {
        (LinkState::Connecting, LinkState::Live) => {
            info!("MQTT connection established");
        }
        (LinkState::Live, LinkState::Disconnected(reason)) => {
            warn!("MQTT connection lost: {}", reason);
        }
        (_, LinkState::Retrying { attempt }) => {
            debug!("Reconnect attempt {} scheduled", attempt);
        }
        (LinkState::Retrying { attempt }, LinkState::Live) => {
            info!("Reconnection successful on attempt {}", attempt);
        }
        (_, LinkState::Exhausted { attempts }) => {
            error!(
                "MQTT connection permanently failed after {} attempts",
                attempts
            );
        }
        _ => {
            debug!("Link state transition: {:?} -> {:?}", from, to);
        }
    }
}

fn transition(state: &watch::Sender<LinkState>, next: LinkState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        log_state_transition(current, &next);
        *current = next;
        true
    });
}

/// One run of the reconnect protocol
pub struct ReconnectEpisode<T: Transport> {
    transport: Arc<T>,
    policy: ReconnectPolicy,
    exit_flag: ExitFlag,
    state: Arc<watch::Sender<LinkState>>,
}

impl<T: Transport> ReconnectEpisode<T> {
    pub fn new(
        transport: Arc<T>,
        policy: ReconnectPolicy,
        exit_flag: ExitFlag,
        state: Arc<watch::Sender<LinkState>>,
    ) -> Self {
        Self {
            transport,
            policy,
            exit_flag,
            state,
        }
    }

    pub async fn run(&self) -> EpisodeReport {
        let span = reconnect_span!(
            max_attempts = self.policy.max_attempts,
            ceiling_secs = self.policy.ceiling.as_secs()
        );
        self.run_attempts().instrument(span).await
    }

    async fn run_attempts(&self) -> EpisodeReport {
        let mut backoff = ReconnectState::new(&self.policy);
        let mut delays = Vec::new();

        loop {
            match backoff.next_decision() {
                ReconnectionDecision::Proceed { attempt, delay } => {
                    transition(&self.state, LinkState::Retrying { attempt });
                    info!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        "Waiting before reconnect attempt"
                    );
                    delays.push(delay);
                    tokio::time::sleep(delay).await;

                    match self.transport.reconnect().await {
                        Ok(()) => {
                            info!(attempt, "Reconnected to broker");
                            transition(&self.state, LinkState::Live);
                            return EpisodeReport {
                                outcome: EpisodeOutcome::Reconnected { attempt },
                                delays,
                            };
                        }
                        Err(e) => {
                            error!(attempt, error = %e, "Reconnect attempt failed");
                            backoff.record_failure();
                        }
                    }
                }
                ReconnectionDecision::Exhausted { attempts } => {
                    error!(
                        attempts,
                        "Unable to reconnect to broker after {} attempts, stopping publication",
                        attempts
                    );
                    transition(&self.state, LinkState::Exhausted { attempts });
                    if self.exit_flag.raise() {
                        info!("Exit flag raised");
                    }
                    return EpisodeReport {
                        outcome: EpisodeOutcome::Exhausted { attempts },
                        delays,
                    };
                }
            }
        }
    }
}

struct Shared<T: Transport> {
    transport: Arc<T>,
    topic: String,
    policy: ReconnectPolicy,
    exit_flag: ExitFlag,
    state: Arc<watch::Sender<LinkState>>,
    episode_active: AtomicBool,
    episode_handle: Mutex<Option<JoinHandle<()>>>,
    last_episode: Mutex<Option<EpisodeReport>>,
}

impl<T: Transport + 'static> Shared<T> {
    async fn on_connect(&self, result: ConnectResult) {
        match result {
            ConnectResult::Accepted if self.transport.is_connected() => {
                if let Err(e) = self.transport.subscribe(&self.topic).await {
                    error!(topic = %self.topic, error = %e, "Failed to subscribe");
                }
                info!(topic = %self.topic, "Connected to broker");
                transition(&self.state, LinkState::Live);
            }
            ConnectResult::Accepted => {
                error!("Handshake accepted but transport reports no live session");
            }
            ConnectResult::Refused(code) => {
                error!(code = %code, "Failed to connect, return code {}", code);
            }
        }
    }

    async fn on_disconnect(self: &Arc<Self>, reason: String) {
        transition(&self.state, LinkState::Disconnected(reason.clone()));

        if self.exit_flag.is_raised() {
            debug!("Exit flag raised, not reconnecting");
            return;
        }

        if self
            .episode_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(reason = %reason, "Reconnect already in progress, ignoring disconnect");
            return;
        }

        warn!(reason = %reason, "Disconnected from broker, starting reconnect");
        self.spawn_episode().await;
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        info!(
            topic = %topic,
            bytes = payload.len(),
            "Received message: {}",
            String::from_utf8_lossy(payload)
        );
    }

    /// Caller must hold the `episode_active` claim
    async fn spawn_episode(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let episode = ReconnectEpisode::new(
                    shared.transport.clone(),
                    shared.policy.clone(),
                    shared.exit_flag.clone(),
                    shared.state.clone(),
                );
                let report = episode.run().await;
                let outcome = report.outcome;
                *shared.last_episode.lock().await = Some(report);

                shared.episode_active.store(false, Ordering::Release);

                // A drop reported while the claim was held was ignored; pick
                // it up here unless the supervisor already has.
                let dropped_again = matches!(outcome, EpisodeOutcome::Reconnected { .. })
                    && !shared.transport.is_connected()
                    && !shared.exit_flag.is_raised();
                if dropped_again
                    && shared
                        .episode_active
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    warn!("Link dropped again during reconnect, starting new episode");
                    continue;
                }
                break;
            }
        });
        *self.episode_handle.lock().await = Some(handle);
    }

    async fn supervise(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Connected(result) => self.on_connect(result).await,
                TransportEvent::Disconnected(reason) => self.on_disconnect(reason).await,
                TransportEvent::Message { topic, payload } => self.on_message(&topic, &payload),
            }
        }
        debug!("Transport event stream closed, supervisor exiting");
    }
}

/// Owns the session lifecycle for one transport
pub struct ConnectionManager<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
    state_rx: watch::Receiver<LinkState>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> ConnectionManager<T> {
    pub fn new(
        transport: Arc<T>,
        topic: impl Into<String>,
        policy: ReconnectPolicy,
        exit_flag: ExitFlag,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        Self {
            shared: Arc::new(Shared {
                transport,
                topic: topic.into(),
                policy,
                exit_flag,
                state: Arc::new(state_tx),
                episode_active: AtomicBool::new(false),
                episode_handle: Mutex::new(None),
                last_episode: Mutex::new(None),
            }),
            state_rx,
            supervisor: Mutex::new(None),
        }
    }

    /// Start consuming transport events and open the session
    ///
    /// Returns the transport's error if the initial handshake fails; no
    /// reconnect episode is started in that case.
    pub async fn connect(&self) -> Result<(), T::Error> {
        transition(&self.shared.state, LinkState::Connecting);

        match self.shared.transport.take_events().await {
            Some(events) => {
                let handle = tokio::spawn(Arc::clone(&self.shared).supervise(events));
                *self.supervisor.lock().await = Some(handle);
            }
            None => warn!("Transport events already taken, handlers not registered"),
        }

        if let Err(e) = self.shared.transport.connect().await {
            error!(error = %e, "Initial connection to broker failed");
            transition(&self.shared.state, LinkState::Disconnected(e.to_string()));
            self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    /// Non-blocking liveness query
    pub fn is_connected(&self) -> bool {
        self.shared.transport.is_connected()
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.shared.transport
    }

    pub fn exit_flag(&self) -> &ExitFlag {
        &self.shared.exit_flag
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }

    pub fn link_state(&self) -> LinkState {
        self.state_rx.borrow().clone()
    }

    /// Watch link state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    pub fn episode_in_progress(&self) -> bool {
        self.shared.episode_active.load(Ordering::Acquire)
    }

    /// Report of the most recently finished episode
    pub async fn last_episode(&self) -> Option<EpisodeReport> {
        self.shared.last_episode.lock().await.clone()
    }

    /// Stop the supervisor and any running episode
    pub async fn stop(&self) {
        if let Some(handle) = self.supervisor.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.shared.episode_handle.lock().await.take() {
            handle.abort();
        }
    }
}
