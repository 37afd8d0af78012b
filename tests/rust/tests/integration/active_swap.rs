//! Swapping the active server at runtime

use std::time::Duration;

use mcplink_core::{ConnectionState, DomainEvent, ServerUpdate};
use pretty_assertions::assert_eq;
use tests::async_helpers::settle;
use tests::fixtures::names;
use tests::{events, Script, SupervisorHarness};

const ALPHA: &str = "http://alpha:8081";
const BETA: &str = "http://beta:8082";

#[tokio::test(start_paused = true)]
async fn test_activation_swaps_connection() {
    let mut h = SupervisorHarness::new();
    h.start_listener();
    h.connector.set(ALPHA, Script::succeed(&["a1", "a2"]));
    h.connector.set(BETA, Script::succeed(&["b1", "b2", "b3"]));
    let cache = h.cache();

    let alpha = h.add_active_server("alpha", ALPHA, "secret1").await;
    let beta = h.add_server("beta", BETA, "secret2").await;
    settle().await;

    // The activation event reached the supervisor through the bus
    assert_eq!(
        h.supervisor.status(alpha.id).unwrap().state,
        ConnectionState::Active
    );
    assert_eq!(names(&cache.get_capabilities().await), vec!["a1", "a2"]);

    let mut rx = h.subscribe();
    h.registry.activate(beta.id).await.unwrap();
    settle().await;

    // Exactly one live connection, to beta
    assert!(h.supervisor.status(alpha.id).is_none());
    assert_eq!(
        h.supervisor.status(beta.id).unwrap().state,
        ConnectionState::Active
    );
    assert_eq!(h.supervisor.live_handle_count(), 1);
    assert_eq!(h.connector.open_connections(), 1);
    assert!(h.connector.connections()[0].is_closed());
    assert_eq!(h.connector.calls_for(BETA)[0].credential, "secret2");

    assert_eq!(names(&cache.get_capabilities().await), vec!["b1", "b2", "b3"]);

    let active_events = events::drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::ConnectionStateChanged { server_id, state: ConnectionState::Active, .. } if *server_id == beta.id))
        .count();
    assert_eq!(active_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_swap_during_backoff_cancels_old_retries() {
    let mut h = SupervisorHarness::new();
    h.start_listener();
    h.connector.set(ALPHA, Script::refused());
    h.connector.set(BETA, Script::succeed(&["b1"]));

    h.add_active_server("alpha", ALPHA, "").await;
    let beta = h.add_server("beta", BETA, "").await;
    settle().await;
    assert_eq!(h.connector.calls_for(ALPHA).len(), 1);

    h.registry.activate(beta.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1000)).await;

    // No alpha retry fired after the swap
    assert_eq!(h.connector.calls_for(ALPHA).len(), 1);
    assert_eq!(
        h.supervisor.status(beta.id).unwrap().state,
        ConnectionState::Active
    );
}

#[tokio::test(start_paused = true)]
async fn test_swap_while_attempt_in_flight() {
    let mut h = SupervisorHarness::new();
    h.start_listener();
    h.connector.set(
        ALPHA,
        Script::delayed(Duration::from_secs(10), Script::succeed(&["a1"])),
    );
    h.connector.set(BETA, Script::succeed(&["b1"]));

    let alpha = h.add_active_server("alpha", ALPHA, "").await;
    let beta = h.add_server("beta", BETA, "").await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.registry.activate(beta.id).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;

    // Alpha's late handshake was discarded and closed
    assert!(h.supervisor.status(alpha.id).is_none());
    assert_eq!(h.supervisor.live_handle_count(), 1);
    assert_eq!(h.connector.open_connections(), 1);
    let open: Vec<String> = h
        .connector
        .connections()
        .into_iter()
        .filter(|c| !c.is_closed())
        .map(|c| c.url.clone())
        .collect();
    assert_eq!(open, vec![BETA.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_deactivate_all_closes_everything() {
    let mut h = SupervisorHarness::new();
    h.start_listener();
    h.connector.set(ALPHA, Script::succeed(&["a1"]));
    let cache = h.cache();

    h.add_active_server("alpha", ALPHA, "").await;
    settle().await;
    assert_eq!(h.supervisor.live_handle_count(), 1);

    h.registry.deactivate_all().await.unwrap();
    settle().await;

    assert!(h.supervisor.statuses().is_empty());
    assert_eq!(h.connector.open_connections(), 0);
    assert!(cache.get_capabilities().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_updating_active_server_reconnects() {
    let mut h = SupervisorHarness::new();
    h.start_listener();
    h.connector.set(ALPHA, Script::succeed(&["a1"]));
    h.connector.set("http://alpha:9091", Script::succeed(&["a1", "a2"]));

    let alpha = h.add_active_server("alpha", ALPHA, "secret1").await;
    settle().await;

    h.registry
        .update(
            alpha.id,
            ServerUpdate::new("alpha", "http://alpha:9091").with_credential("secret2"),
        )
        .await
        .unwrap();
    settle().await;

    let calls = h.connector.calls_for("http://alpha:9091");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].credential, "secret2");
    assert_eq!(h.supervisor.status(alpha.id).unwrap().capability_count, 2);
    assert_eq!(h.connector.open_connections(), 1);
}
