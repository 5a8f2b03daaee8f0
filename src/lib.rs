//! Solar Telemetry Publisher
//!
//! Generates synthetic solar-panel sensor readings and publishes them to an
//! MQTT broker at a fixed cadence, keeping the session alive with a bounded
//! exponential-backoff reconnect protocol.
//!
//! # Overview
//!
//! - [`transport`] - the transport seam and its rumqttc-based MQTT client
//! - [`connection`] - connection manager, reconnect episodes, backoff policy
//! - [`publisher`] - the publication loop
//! - [`telemetry`] - reading record, wire encoding and generators
//! - [`lifecycle`] - startup and shutdown sequence used by the binary
//! - [`exit_flag`] - the stop signal shared by the manager and the loop
//!
//! # Quick Start
//!
//! ```rust
//! use solar_telemetry::telemetry::{ReadingGenerator, SensorReading, SteadyGenerator};
//!
//! let reading = SteadyGenerator.generate();
//! let json = reading.to_json().unwrap();
//!
//! let parsed = SensorReading::from_json(json.as_bytes()).unwrap();
//! assert_eq!(parsed, reading);
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod exit_flag;
pub mod lifecycle;
pub mod observability;
pub mod publisher;
pub mod telemetry;
pub mod testing;
pub mod transport;

pub use config::*;
pub use connection::{ConnectionManager, LinkState, ReconnectPolicy};
pub use error::{PublisherError, PublisherResult};
pub use exit_flag::ExitFlag;
pub use lifecycle::{PublisherLifecycle, RunOutcome};
pub use publisher::{PublicationLoop, TickOutcome};
pub use telemetry::SensorReading;
pub use transport::mqtt::MqttClient;
