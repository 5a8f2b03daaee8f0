//! Publication of simulated readings

pub mod publication_loop;

pub use publication_loop::{LoopSummary, LoopTiming, PublicationLoop, TickOutcome};

use crate::config::PublisherConfig;
use std::time::Duration;

impl From<&PublisherConfig> for LoopTiming {
    fn from(config: &PublisherConfig) -> Self {
        Self {
            interval: config.interval(),
            disconnected_retry: Duration::from_secs(config.publisher.disconnected_retry_secs),
        }
    }
}
