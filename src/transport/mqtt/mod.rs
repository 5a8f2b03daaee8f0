//! MQTT transport built on rumqttc (MQTT v5)
//!
//! # Architecture
//!
//! - [`connection`] - Pure session configuration: URL parsing, client id, options
//! - [`tls`] - TLS transport selection, including the opt-in insecure mode
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`client`] - Impure I/O: the driver task and the [`Transport`](crate::transport::Transport) impl
//!
//! # Usage
//!
//! ```rust,no_run
//! use solar_telemetry::config::PublisherConfig;
//! use solar_telemetry::transport::mqtt::MqttClient;
//! use solar_telemetry::transport::Transport;
//!
//! # tokio_test::block_on(async {
//! let config = PublisherConfig::from_env()?;
//! let client = MqttClient::new(&config)?;
//! client.connect().await?;
//! client.subscribe(&config.broker.topic).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;
pub mod tls;

pub use client::MqttClient;
pub use connection::{
    configure_mqtt_options, generate_client_id, parse_broker_url, BrokerAddress, MqttError,
    SessionOptions,
};
pub use message_handler::{EventRoute, MessageHandler};
