//! Pure session configuration for the MQTT client
//!
//! This module turns a [`PublisherConfig`] into the session parameters used
//! for every handshake: broker address, client identifier, credentials,
//! keepalive and TLS transport. Nothing here touches the network.

use super::tls::build_transport;
use crate::config::{PublisherConfig, TlsSection, MIN_KEEPALIVE_SECS};
use rumqttc::v5::MqttOptions;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),
    #[error("No connection acknowledgement within {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Keepalive of {secs}s is below the {MIN_KEEPALIVE_SECS}s minimum")]
    KeepAliveTooShort { secs: u64 },
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Event loop already started")]
    AlreadyStarted,
    #[error("Event loop closed")]
    EventLoopClosed,
}

/// Broker address extracted from a `mqtt://` or `mqtts://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse a broker URL, defaulting the port by scheme
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let use_tls = match url.scheme() {
        "mqtts" => true,
        "mqtt" => false,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if use_tls { 8883 } else { 1883 });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        use_tls,
    })
}

/// Build a session identifier: `<prefix>-<8 hex chars>`
///
/// The suffix is random so two publishers started from the same
/// configuration never collide on the broker.
pub fn generate_client_id(prefix: &str) -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &simple[..8])
}

/// Parameters fixed for the lifetime of one client
///
/// The same identifier and credentials are presented on every reconnect.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub client_id: String,
    pub address: BrokerAddress,
    pub credentials: Option<(String, String)>,
    pub keepalive: Duration,
    pub connect_timeout: Duration,
    pub tls: TlsSection,
}

impl SessionOptions {
    pub fn from_config(config: &PublisherConfig) -> Result<Self, MqttError> {
        let address = parse_broker_url(&config.broker.broker_url)?;
        Ok(Self {
            client_id: generate_client_id(&config.broker.client_id_prefix),
            address,
            credentials: config.credentials(),
            keepalive: Duration::from_secs(config.broker.keepalive_secs),
            connect_timeout: Duration::from_secs(config.broker.connect_timeout_secs),
            tls: config.tls.clone(),
        })
    }
}

/// Configure rumqttc options for a session
pub fn configure_mqtt_options(session: &SessionOptions) -> Result<MqttOptions, MqttError> {
    // rumqttc panics below the minimum
    if session.keepalive.as_secs() < MIN_KEEPALIVE_SECS {
        return Err(MqttError::KeepAliveTooShort {
            secs: session.keepalive.as_secs(),
        });
    }

    let mut mqtt_options = MqttOptions::new(
        session.client_id.clone(),
        session.address.host.clone(),
        session.address.port,
    );

    if session.address.use_tls {
        mqtt_options.set_transport(build_transport(&session.tls)?);
    }

    if let Some((username, password)) = &session.credentials {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(session.keepalive);
    mqtt_options.set_clean_start(true);

    Ok(mqtt_options)
}
