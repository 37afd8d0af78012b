//! CapabilityCache over a live supervisor

use std::time::Duration;

use mcplink_gateway::CacheTtl;
use pretty_assertions::assert_eq;
use tests::async_helpers::settle;
use tests::fixtures::names;
use tests::{Script, SupervisorHarness};

const ALPHA: &str = "http://alpha:8081";

#[tokio::test(start_paused = true)]
async fn test_empty_before_connection_then_populated() {
    let h = SupervisorHarness::new();
    h.add_active_server("alpha", ALPHA, "").await;
    h.connector
        .set(ALPHA, Script::delayed(Duration::from_secs(5), Script::succeed(&["search", "fetch", "summarize"])));
    let cache = h.cache();

    h.supervisor.initialize().await.unwrap();
    assert!(cache.get_capabilities().await.is_empty());

    // Connection lands after 5s; the empty list expires after 2s anyway
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(
        names(&cache.get_capabilities().await),
        vec!["search", "fetch", "summarize"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cached_list_served_without_remote_calls() {
    let h = SupervisorHarness::new();
    h.add_active_server("alpha", ALPHA, "").await;
    h.connector.set(ALPHA, Script::succeed(&["search", "fetch", "summarize"]));
    let cache = h.cache();

    h.supervisor.initialize().await.unwrap();
    settle().await;

    let connection = h.connector.connections()[0].clone();
    // One listing during the handshake
    assert_eq!(connection.list_calls(), 1);

    assert_eq!(cache.get_capabilities().await.len(), 3);
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(cache.get_capabilities().await.len(), 3);
    assert_eq!(connection.list_calls(), 2);

    tokio::time::advance(Duration::from_secs(21)).await;
    cache.get_capabilities().await;
    assert_eq!(connection.list_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connection_change_invalidates() {
    let h = SupervisorHarness::new();
    let alpha = h.add_active_server("alpha", ALPHA, "").await;
    h.connector.set(ALPHA, Script::succeed(&["search"]));
    let cache = h.cache();

    h.supervisor.initialize().await.unwrap();
    settle().await;
    assert_eq!(cache.get_capabilities().await.len(), 1);

    // Disabling drops the live handle; the cache must not keep serving it
    h.supervisor.disable(alpha.id).await.unwrap();
    assert!(cache.get_capabilities().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_custom_ttl() {
    let h = SupervisorHarness::new();
    h.add_active_server("alpha", ALPHA, "").await;
    h.connector.set(ALPHA, Script::succeed(&["search"]));
    let cache = mcplink_gateway::CapabilityCache::with_ttl(
        h.supervisor.clone(),
        CacheTtl {
            non_empty: Duration::from_secs(1),
            empty: Duration::from_secs(1),
        },
    );

    h.supervisor.initialize().await.unwrap();
    settle().await;
    let connection = h.connector.connections()[0].clone();

    cache.get_capabilities().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    cache.get_capabilities().await;
    assert_eq!(connection.list_calls(), 3);
}
