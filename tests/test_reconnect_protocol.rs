//! Integration tests for the reconnect protocol
//!
//! Drives the connection manager against the mock transport with a paused
//! clock, so backoff delays are observed exactly:
//! - every failed attempt grows the delay geometrically up to the ceiling
//! - an episode stops at the first successful attempt
//! - exhaustion raises the exit flag exactly once
//! - a second drop during an episode never starts a parallel episode


use solar_telemetry::connection::{EpisodeOutcome, LinkState, ReconnectPolicy};
use std::time::Duration;
use test_helpers::{connected_manager, default_policy, gaps, secs};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_exhaustion_follows_default_schedule() {
    // Arrange
    let (manager, transport, exit_flag) = connected_manager(default_policy()).await;
    let mut state = manager.subscribe_state();

    // Act: broker drops the session and never comes back
    let origin = Instant::now();
    transport.drop_connection("keepalive timeout").await;
    state
        .wait_for(|s| matches!(s, LinkState::Exhausted { .. }))
        .await
        .expect("state channel open");

    // Assert: 12 attempts spaced 1, 2, 4, ..., 32, then 60 six times
    let expected = secs(&[1, 2, 4, 8, 16, 32, 60, 60, 60, 60, 60, 60]);
    let times = transport.reconnect_times().await;
    assert_eq!(times.len(), 12);
    assert_eq!(gaps(origin, &times), expected);
    assert_eq!(manager.link_state(), LinkState::Exhausted { attempts: 12 });

    // Exit flag already raised by the episode; a second raise is a no-op
    assert!(exit_flag.is_raised());
    assert!(!exit_flag.raise());

    let report = manager.last_episode().await.expect("episode recorded");
    assert_eq!(report.outcome, EpisodeOutcome::Exhausted { attempts: 12 });
    assert_eq!(report.delays, expected);
    assert_eq!(
        report.delays.iter().sum::<Duration>(),
        Duration::from_secs(423)
    );

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_success_on_third_attempt_ends_episode() {
    // Arrange
    let (manager, transport, exit_flag) = connected_manager(default_policy()).await;
    transport.script_reconnects([false, false, true]).await;
    let mut state = manager.subscribe_state();

    // Act
    let origin = Instant::now();
    transport.drop_connection("broker restart").await;
    state
        .wait_for(|s| matches!(s, LinkState::Retrying { .. }))
        .await
        .expect("state channel open");
    state
        .wait_for(LinkState::is_live)
        .await
        .expect("state channel open");

    // Give any stray attempt a chance to show up
    tokio::time::sleep(Duration::from_secs(600)).await;

    // Assert
    let times = transport.reconnect_times().await;
    assert_eq!(gaps(origin, &times), secs(&[1, 2, 4]));
    assert_eq!(transport.reconnect_calls(), 3);
    assert!(manager.is_connected());
    assert!(!exit_flag.is_raised());

    let report = manager.last_episode().await.expect("episode recorded");
    assert_eq!(report.outcome, EpisodeOutcome::Reconnected { attempt: 3 });
    assert!(!manager.episode_in_progress());

    // Resubscribed after the new session came up
    assert_eq!(transport.subscriptions().await.len(), 2);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_next_episode_restarts_from_first_delay() {
    // Arrange
    let (manager, transport, _exit_flag) = connected_manager(default_policy()).await;
    transport.script_reconnects([false, true]).await;
    let mut state = manager.subscribe_state();

    transport.drop_connection("first drop").await;
    state
        .wait_for(|s| matches!(s, LinkState::Retrying { .. }))
        .await
        .unwrap();
    state.wait_for(LinkState::is_live).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Act: second, unrelated drop
    transport.script_reconnects([true]).await;
    let origin = Instant::now();
    transport.drop_connection("second drop").await;
    state
        .wait_for(|s| matches!(s, LinkState::Retrying { .. }))
        .await
        .unwrap();
    state.wait_for(LinkState::is_live).await.unwrap();

    // Assert: the second episode waits the first delay again, not 4s
    let times = transport.reconnect_times().await;
    assert_eq!(times.len(), 3);
    assert_eq!(gaps(origin, &times[2..]), secs(&[1]));

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_drop_during_episode_does_not_start_second_episode() {
    // Arrange
    let policy = ReconnectPolicy {
        max_attempts: 4,
        ..ReconnectPolicy::default()
    };
    let (manager, transport, exit_flag) = connected_manager(policy).await;
    let mut state = manager.subscribe_state();

    // Act: two disconnect notifications in quick succession
    transport.drop_connection("keepalive timeout").await;
    state
        .wait_for(|s| matches!(s, LinkState::Retrying { .. }))
        .await
        .unwrap();
    transport.drop_connection("io error").await;
    state
        .wait_for(|s| matches!(s, LinkState::Exhausted { .. }))
        .await
        .unwrap();

    // Assert: one episode's worth of attempts
    assert_eq!(transport.reconnect_calls(), 4);
    assert!(exit_flag.is_raised());

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_drop_after_exhaustion_is_ignored() {
    // Arrange
    let policy = ReconnectPolicy {
        max_attempts: 2,
        ..ReconnectPolicy::default()
    };
    let (manager, transport, exit_flag) = connected_manager(policy).await;
    let mut state = manager.subscribe_state();

    transport.drop_connection("gone").await;
    state
        .wait_for(|s| matches!(s, LinkState::Exhausted { .. }))
        .await
        .unwrap();
    assert!(exit_flag.is_raised());

    // Act
    transport.drop_connection("still gone").await;
    tokio::time::sleep(Duration::from_secs(300)).await;

    // Assert
    assert_eq!(transport.reconnect_calls(), 2);

    manager.stop().await;
}
