//! Fixed-cadence publication of generated readings
//!
//! Each tick generates one reading, serializes it and publishes it if the
//! transport reports a live session. Outcomes are logged and never retried.
//! The loop checks the [`ExitFlag`] before every tick and its inter-tick
//! sleep ends early when the flag is raised.

use crate::error::PublisherResult;
use crate::exit_flag::ExitFlag;
use crate::mqtt_span;
use crate::telemetry::ReadingGenerator;
use crate::transport::{PublishStatus, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, Instrument};

/// What happened on one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Handed to the transport
    Published,
    /// Transport rejected or failed the publish
    PublishFailed,
    /// No live session; nothing was sent
    SkippedDisconnected,
}

/// Pacing for the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    /// Sleep after a tick that reached the transport
    pub interval: Duration,
    /// Sleep after a tick skipped for lack of a session
    pub disconnected_retry: Duration,
}

impl LoopTiming {
    pub fn sleep_after(&self, outcome: TickOutcome) -> Duration {
        match outcome {
            TickOutcome::SkippedDisconnected => self.disconnected_retry,
            TickOutcome::Published | TickOutcome::PublishFailed => self.interval,
        }
    }
}

/// Counters for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub published: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl LoopSummary {
    fn record(&mut self, outcome: TickOutcome) {
        match outcome {
            TickOutcome::Published => self.published += 1,
            TickOutcome::PublishFailed => self.failed += 1,
            TickOutcome::SkippedDisconnected => self.skipped += 1,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.published + self.failed + self.skipped
    }
}

pub struct PublicationLoop<T: Transport> {
    transport: Arc<T>,
    generator: Box<dyn ReadingGenerator>,
    topic: String,
    timing: LoopTiming,
    exit_flag: ExitFlag,
}

impl<T: Transport> PublicationLoop<T> {
    pub fn new(
        transport: Arc<T>,
        generator: Box<dyn ReadingGenerator>,
        topic: impl Into<String>,
        timing: LoopTiming,
        exit_flag: ExitFlag,
    ) -> Self {
        Self {
            transport,
            generator,
            topic: topic.into(),
            timing,
            exit_flag,
        }
    }

    /// Generate, serialize and (if live) publish one reading
    pub async fn tick(&mut self) -> PublisherResult<TickOutcome> {
        let reading = self.generator.generate();
        let payload = reading.to_json()?;

        if !self.transport.is_connected() {
            error!(topic = %self.topic, "Not connected to broker, skipping publish");
            return Ok(TickOutcome::SkippedDisconnected);
        }

        let span = mqtt_span!(operation = "publish", topic = %self.topic, bytes = payload.len());
        let result = self
            .transport
            .publish(&self.topic, payload.clone().into_bytes())
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(PublishStatus::Queued) => {
                info!(topic = %self.topic, "Published reading: {}", payload);
                TickOutcome::Published
            }
            Ok(status) => {
                error!(topic = %self.topic, ?status, "Failed to publish reading");
                TickOutcome::PublishFailed
            }
            Err(e) => {
                error!(topic = %self.topic, error = %e, "Failed to publish reading");
                TickOutcome::PublishFailed
            }
        };
        Ok(outcome)
    }

    /// Tick until the exit flag is raised
    pub async fn run(&mut self) -> PublisherResult<LoopSummary> {
        let mut summary = LoopSummary::default();
        info!(
            topic = %self.topic,
            interval_secs = self.timing.interval.as_secs_f64(),
            "Publication loop started"
        );

        while !self.exit_flag.is_raised() {
            let outcome = self.tick().await?;
            summary.record(outcome);

            let pause = self.timing.sleep_after(outcome);
            if !self.exit_flag.sleep(pause).await {
                debug!("Exit flag raised during pause");
            }
        }

        info!(
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            "Publication loop stopped"
        );
        Ok(summary)
    }
}
