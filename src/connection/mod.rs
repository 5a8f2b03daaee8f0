//! Broker session lifecycle
//!
//! - [`backoff`] - pure reconnect policy and per-episode state
//! - [`manager`] - event handling, reconnect episodes and link state

pub mod backoff;
pub mod manager;

pub use backoff::{ReconnectPolicy, ReconnectState, ReconnectionDecision};
pub use manager::{
    log_state_transition, ConnectionManager, EpisodeOutcome, EpisodeReport, LinkState,
    ReconnectEpisode,
};
