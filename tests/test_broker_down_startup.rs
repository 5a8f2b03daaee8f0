//! Integration tests for startup when the broker is unreachable
//!
//! A failed initial connect is fatal: the client reports the error, never
//! claims a live session, and refuses to publish.


use solar_telemetry::connection::LinkState;
use solar_telemetry::transport::{PublishStatus, Transport};
use solar_telemetry::{MqttClient, PublisherLifecycle};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn unreachable_config() -> solar_telemetry::PublisherConfig {
    let mut config = test_helpers::test_config();
    // Port 1 on loopback refuses immediately
    config.broker.broker_url = "mqtt://127.0.0.1:1".to_string();
    config.broker.connect_timeout_secs = 2;
    config
}

#[tokio::test]
async fn test_connect_fails_when_broker_unavailable() {
    // Arrange
    let client = MqttClient::new(&unreachable_config())
        .expect("Client creation should succeed even if broker is down");

    // Act
    let result = timeout(Duration::from_secs(5), client.connect())
        .await
        .expect("connect must give up within the connect timeout");

    // Assert
    assert!(result.is_err(), "Connection should fail when broker unavailable");
    assert!(!client.is_connected());

    let status = client
        .publish("solar/test/data", b"{}".to_vec())
        .await
        .unwrap();
    assert_eq!(status, PublishStatus::NoConnection);
}

#[tokio::test]
async fn test_lifecycle_start_fails_without_reconnecting() {
    // Arrange
    let transport = Arc::new(MqttClient::new(&unreachable_config()).unwrap());
    let lifecycle = PublisherLifecycle::new(unreachable_config(), transport.clone());

    // Act
    let result = timeout(Duration::from_secs(5), lifecycle.start())
        .await
        .expect("start must give up within the connect timeout");

    // Assert: no episode, no exit flag, link reported down
    assert!(result.is_err());
    assert!(!lifecycle.manager().episode_in_progress());
    assert!(!lifecycle.exit_flag().is_raised());
    assert!(matches!(
        lifecycle.manager().link_state(),
        LinkState::Disconnected(_)
    ));

    lifecycle.shutdown().await;
    let _ = transport.disconnect().await;
}
