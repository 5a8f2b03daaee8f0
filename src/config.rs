//! Configuration system for the solar telemetry publisher
//!
//! Configuration is read from a TOML file with four sections: `[broker]`,
//! `[tls]`, `[reconnect]` and `[publisher]`. Only `[broker]` is required when a
//! file is supplied; every other section falls back to its defaults.
//! A handful of environment variables override file values after loading.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment override for `broker.broker_url`
pub const ENV_BROKER_URL: &str = "SOLAR_BROKER_URL";
/// Environment override for `broker.topic`
pub const ENV_TOPIC: &str = "SOLAR_TOPIC";
/// Environment override for `publisher.interval_secs`
pub const ENV_INTERVAL_SECS: &str = "SOLAR_PUBLISH_INTERVAL_SECS";
/// Shortest keepalive rumqttc accepts
pub const MIN_KEEPALIVE_SECS: u64 = 5;

/// Main publisher configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublisherConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub tls: TlsSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub publisher: PublisherSection,
}

/// Broker section - where to connect and as whom
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// MQTT broker URL with protocol and port (`mqtt://` or `mqtts://`)
    pub broker_url: String,
    /// Topic readings are published to and subscribed on
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Prefix for the per-process client identifier (must match [a-zA-Z0-9._-]+)
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    /// Literal username (prefer `username_env` outside of development)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Literal password; never written back out by `config --show`
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// Keepalive window in seconds, at least 5 (default: 5)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
    /// How long to wait for the broker's ConnAck on the initial connect and on
    /// every reconnect attempt (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            broker_url: "mqtts://localhost:8883".to_string(),
            topic: default_topic(),
            client_id_prefix: default_client_id_prefix(),
            username: None,
            password: None,
            username_env: Some("MQTT_USERNAME".to_string()),
            password_env: Some("MQTT_PASSWORD".to_string()),
            keepalive_secs: default_keepalive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_topic() -> String {
    "solar/sensor/data".to_string()
}

fn default_client_id_prefix() -> String {
    "solar-backend".to_string()
}

fn default_keepalive() -> u64 {
    MIN_KEEPALIVE_SECS
}

fn default_connect_timeout() -> u64 {
    10
}

/// TLS section - only consulted for `mqtts://` broker URLs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TlsSection {
    /// Validate the broker certificate chain and hostname
    #[serde(default = "default_true")]
    pub verify_certificates: bool,
    /// Must be set for `verify_certificates = false` to be accepted
    #[serde(default)]
    pub allow_insecure: bool,
    /// PEM bundle to trust instead of the platform roots
    pub ca_file: Option<String>,
}

impl Default for TlsSection {
    fn default() -> Self {
        Self {
            verify_certificates: true,
            allow_insecure: false,
            ca_file: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Reconnect section - backoff policy applied after the session drops
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Delay before the first reconnect attempt (default: 1)
    #[serde(default = "default_first_delay")]
    pub first_delay_secs: u64,
    /// Multiplier applied to the delay after each failed attempt (default: 2.0)
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Ceiling for the delay (default: 60)
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Attempts per disconnect episode before giving up (default: 12)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            first_delay_secs: default_first_delay(),
            rate: default_rate(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_first_delay() -> u64 {
    1
}

fn default_rate() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    12
}

/// Publisher section - cadence and content of the publication loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublisherSection {
    /// Seconds between publications (default: 60)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds to wait after a tick skipped because the link was down (default: 1)
    #[serde(default = "default_disconnected_retry")]
    pub disconnected_retry_secs: u64,
    /// Which reading generator to use
    #[serde(default)]
    pub generator: GeneratorKind,
    /// What the process does once reconnection has been exhausted
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for PublisherSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            disconnected_retry_secs: default_disconnected_retry(),
            generator: GeneratorKind::default(),
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_disconnected_retry() -> u64 {
    1
}

/// Reading generator selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Weather-correlated random readings
    #[default]
    Realistic,
    /// Fixed-shape readings for stress and demo runs
    Steady,
}

/// Terminal behaviour after the reconnect protocol gives up
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    /// Stop publishing and exit with a failure status
    #[default]
    Exit,
    /// Stop publishing and idle until the process is signalled
    Idle,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid client id prefix: {0}")]
    InvalidClientIdPrefix(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PublisherConfig {
    /// Load configuration from TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: PublisherConfig = toml::from_str(&content)?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Built-in defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SOLAR_*` environment overrides on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = std::env::var(ENV_BROKER_URL) {
            self.broker.broker_url = url;
        }
        if let Ok(topic) = std::env::var(ENV_TOPIC) {
            self.broker.topic = topic;
        }
        if let Ok(raw) = std::env::var(ENV_INTERVAL_SECS) {
            self.publisher.interval_secs = raw.trim().parse().map_err(|_| {
                ConfigError::InvalidConfig(format!(
                    "{ENV_INTERVAL_SECS} must be a whole number of seconds, got '{raw}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Check value ranges and cross-field rules
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_client_id_prefix(&self.broker.client_id_prefix)?;

        if self.broker.topic.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.topic must not be empty".to_string(),
            ));
        }
        if self.broker.topic.contains(['+', '#']) {
            return Err(ConfigError::InvalidConfig(format!(
                "broker.topic '{}' must not contain wildcards",
                self.broker.topic
            )));
        }
        if self.broker.keepalive_secs < MIN_KEEPALIVE_SECS {
            return Err(ConfigError::InvalidConfig(format!(
                "broker.keepalive_secs must be at least {MIN_KEEPALIVE_SECS}, got {}",
                self.broker.keepalive_secs
            )));
        }
        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be at least 1".to_string(),
            ));
        }

        if !self.tls.verify_certificates && !self.tls.allow_insecure {
            return Err(ConfigError::InvalidConfig(
                "tls.verify_certificates = false requires tls.allow_insecure = true".to_string(),
            ));
        }

        self.reconnect.validate()?;

        if self.publisher.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "publisher.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.publisher.disconnected_retry_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "publisher.disconnected_retry_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Helper method to get environment variable with consistent error handling
    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    /// Get MQTT username: environment variable first, then the literal value
    pub fn get_mqtt_username(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.username_env.as_ref())
            .or_else(|| self.broker.username.clone())
    }

    /// Get MQTT password: environment variable first, then the literal value
    pub fn get_mqtt_password(&self) -> Option<String> {
        Self::get_env_var_optional(self.broker.password_env.as_ref())
            .or_else(|| self.broker.password.clone())
    }

    /// Resolve a username/password pair; a username without password gets an empty one
    pub fn credentials(&self) -> Option<(String, String)> {
        self.get_mqtt_username()
            .map(|username| (username, self.get_mqtt_password().unwrap_or_default()))
    }

    /// Publication interval as a `Duration`
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.publisher.interval_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[broker]
broker_url = "mqtt://localhost:1883"
topic = "solar/test/data"
client_id_prefix = "solar-test"

[publisher]
interval_secs = 1
generator = "steady"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

impl ReconnectSection {
    /// Validate the backoff constants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first_delay_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.first_delay_secs must be at least 1".to_string(),
            ));
        }
        if !self.rate.is_finite() || self.rate < 1.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect.rate must be a finite number >= 1.0, got {}",
                self.rate
            )));
        }
        if self.max_delay_secs < self.first_delay_secs {
            return Err(ConfigError::InvalidConfig(format!(
                "reconnect.max_delay_secs ({}) must not be below first_delay_secs ({})",
                self.max_delay_secs, self.first_delay_secs
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate client id prefix format (MQTT client ids are safest as [a-zA-Z0-9._-]+)
fn validate_client_id_prefix(prefix: &str) -> Result<(), ConfigError> {
    let valid_chars = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if prefix.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidClientIdPrefix(format!(
            "Client id prefix '{prefix}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
