//! Publisher lifecycle: connect, publish until stopped, shut down
//!
//! The lifecycle owns the [`ConnectionManager`] and the process-wide
//! [`ExitFlag`]. Transport construction stays with the caller so the same
//! sequence runs against the MQTT client and against test doubles.

use crate::config::PublisherConfig;
use crate::connection::{ConnectionManager, LinkState, ReconnectPolicy};
use crate::error::PublisherResult;
use crate::exit_flag::ExitFlag;
use crate::publisher::{LoopSummary, LoopTiming, PublicationLoop};
use crate::telemetry::{generator_for, ReadingGenerator};
use crate::transport::Transport;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Why [`PublisherLifecycle::run_until`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The shutdown future completed
    Shutdown,
    /// The reconnect protocol gave up and raised the exit flag
    Exhausted { attempts: u32, summary: LoopSummary },
}

pub struct PublisherLifecycle<T: Transport + 'static> {
    config: PublisherConfig,
    manager: ConnectionManager<T>,
    exit_flag: ExitFlag,
}

impl<T: Transport + 'static> PublisherLifecycle<T> {
    pub fn new(config: PublisherConfig, transport: Arc<T>) -> Self {
        let exit_flag = ExitFlag::new();
        let manager = ConnectionManager::new(
            transport,
            config.broker.topic.clone(),
            ReconnectPolicy::from(&config.reconnect),
            exit_flag.clone(),
        );
        Self {
            config,
            manager,
            exit_flag,
        }
    }

    pub fn manager(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    pub fn exit_flag(&self) -> &ExitFlag {
        &self.exit_flag
    }

    /// Open the broker session; publication must not start if this fails
    pub async fn start(&self) -> Result<(), T::Error> {
        self.manager.connect().await?;
        info!(
            topic = %self.config.broker.topic,
            "Publisher started"
        );
        Ok(())
    }

    /// Publish with the configured generator until `shutdown` completes or
    /// the exit flag is raised
    pub async fn run_until<F>(&self, shutdown: F) -> PublisherResult<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        self.run_with_generator(generator_for(self.config.publisher.generator), shutdown)
            .await
    }

    pub async fn run_with_generator<F>(
        &self,
        generator: Box<dyn ReadingGenerator>,
        shutdown: F,
    ) -> PublisherResult<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut publication = PublicationLoop::new(
            self.manager.transport().clone(),
            generator,
            self.config.broker.topic.clone(),
            LoopTiming::from(&self.config),
            self.exit_flag.clone(),
        );

        tokio::select! {
            summary = publication.run() => {
                let summary = summary?;
                let attempts = match self.manager.link_state() {
                    LinkState::Exhausted { attempts } => attempts,
                    _ => self.manager.policy().max_attempts,
                };
                Ok(RunOutcome::Exhausted { attempts, summary })
            }
            _ = shutdown => Ok(RunOutcome::Shutdown),
        }
    }

    /// Stop the connection manager's tasks
    pub async fn shutdown(&self) {
        self.manager.stop().await;
        info!("Publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorKind;
    use crate::telemetry::SteadyGenerator;
    use crate::testing::mocks::MockTransport;
    use std::time::Duration;

    fn config() -> PublisherConfig {
        let mut config = PublisherConfig::test_config();
        config.publisher.generator = GeneratorKind::Steady;
        config.reconnect.max_attempts = 2;
        config
    }

    #[tokio::test]
    async fn test_start_fails_when_broker_unreachable() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next_connect("connection refused").await;
        let lifecycle = PublisherLifecycle::new(config(), transport.clone());

        assert!(lifecycle.start().await.is_err());
        assert_eq!(transport.publish_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_future_stops_run() {
        let transport = Arc::new(MockTransport::new());
        let lifecycle = PublisherLifecycle::new(config(), transport.clone());
        lifecycle.start().await.unwrap();

        let outcome = lifecycle
            .run_with_generator(
                Box::new(SteadyGenerator),
                tokio::time::sleep(Duration::from_millis(2500)),
            )
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Shutdown);
        // interval_secs = 1: ticks at 0, 1, 2
        assert_eq!(transport.published().await.len(), 3);
        lifecycle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_ends_run() {
        let transport = Arc::new(MockTransport::new());
        let lifecycle = PublisherLifecycle::new(config(), transport.clone());
        lifecycle.start().await.unwrap();

        let dropper = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            dropper.drop_connection("keepalive timeout").await;
        });

        let outcome = lifecycle
            .run_until(std::future::pending())
            .await
            .unwrap();

        match outcome {
            RunOutcome::Exhausted { attempts, summary } => {
                assert_eq!(attempts, 2);
                assert!(summary.skipped > 0);
            }
            other => panic!("Expected exhaustion, got {other:?}"),
        }
        assert!(lifecycle.exit_flag().is_raised());
        assert_eq!(transport.reconnect_calls(), 2);
    }
}
