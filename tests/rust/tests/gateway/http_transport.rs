//! Streamable HTTP transport against an in-process tool server

use std::sync::Arc;
use std::time::Duration;

use mcplink_core::{ConnectionState, DomainEvent, EventBus, NewServer, ServerRegistry};
use mcplink_gateway::{
    ConnectTarget, ConnectionSupervisor, ConnectionTester, Connector, HttpConnector,
    TransportConfig,
};
use pretty_assertions::assert_eq;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::fixtures::{names, test_vault};
use tests::{events, MockServerRepository, TestToolServer};

fn connector() -> HttpConnector {
    tests::init_test_logging();
    HttpConnector::new(TransportConfig {
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connect_and_list_with_api_key() {
    let server = TestToolServer::start("secret1", &["search", "fetch"]).await;

    let target = ConnectTarget::new(None, "alpha", server.base_url.clone(), "secret1".to_string());
    let connection = connector().connect(&target).await.expect("should connect");

    let capabilities = connection.list_capabilities().await.unwrap();
    assert_eq!(names(&capabilities), vec!["search", "fetch"]);
    assert_eq!(
        capabilities[0].description.as_deref(),
        Some("Test tool: search")
    );

    connection.close().await;
    // Closing twice is harmless
    connection.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_explicit_endpoint_path_is_not_doubled() {
    let server = TestToolServer::start("secret1", &["search"]).await;

    let url = format!("{}/mcp", server.base_url);
    let target = ConnectTarget::new(None, "alpha", url, "secret1".to_string());
    let connection = connector().connect(&target).await.expect("should connect");
    assert_eq!(connection.list_capabilities().await.unwrap().len(), 1);
    connection.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_api_key_is_rejected() {
    let server = TestToolServer::start("secret1", &["search"]).await;

    let target = ConnectTarget::new(None, "alpha", server.base_url.clone(), "wrong".to_string());
    let result = connector().connect(&target).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_is_retryable() {
    // Bind and drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let target = ConnectTarget::new(
        None,
        "alpha",
        format!("http://127.0.0.1:{}", port),
        String::new(),
    );
    let err = match connector().connect(&target).await {
        Err(e) => e,
        Ok(_) => panic!("nothing listens on port {}", port),
    };
    assert!(err.is_retryable(), "unexpected error kind {:?}: {}", err.kind, err);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tester_against_real_server() {
    let server = TestToolServer::start("secret1", &["search", "fetch", "summarize"]).await;
    let repo = Arc::new(MockServerRepository::new());
    let connector: Arc<dyn Connector> = Arc::new(connector());
    let tester = ConnectionTester::new(repo, test_vault(), connector);

    let ok = tester.test_candidate(&server.base_url, "secret1").await.unwrap();
    assert!(ok.success, "{}", ok.message);
    assert_eq!(ok.capability_count, 3);

    let rejected = tester.test_candidate(&server.base_url, "wrong").await.unwrap();
    assert!(!rejected.success);
    assert!(rejected.message.starts_with("Connection failed:"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tool_list_changed_refreshes_status() {
    let server = TestToolServer::start("secret1", &["search"]).await;

    let repo = Arc::new(MockServerRepository::new());
    let vault = test_vault();
    let bus = EventBus::new();
    let registry = ServerRegistry::new(repo.clone(), vault.clone(), bus.sender());
    let connector: Arc<dyn Connector> =
        Arc::new(connector().with_event_sender(bus.sender()));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        repo.clone(),
        vault,
        connector,
        bus.sender(),
    ));

    let alpha = registry
        .create(NewServer::new("alpha", &server.base_url, "secret1"))
        .await
        .unwrap();
    registry.activate(alpha.id).await.unwrap();

    let listener = supervisor.spawn_event_listener(bus.subscribe());
    let mut rx = bus.subscribe();
    supervisor.initialize().await.unwrap();

    let connected = events::wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(
            e,
            DomainEvent::ConnectionStateChanged {
                state: ConnectionState::Active,
                ..
            }
        )
    })
    .await;
    assert!(connected.is_some(), "supervisor should connect");
    with_timeout(DEFAULT_TIMEOUT, server.handler.peer_ready.notified()).await;

    // Let the SSE stream establish before pushing the notification
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.handler.set_tools(&["search", "fetch"]).await;

    let changed = events::wait_for_event(&mut rx, DEFAULT_TIMEOUT, |e| {
        matches!(e, DomainEvent::CapabilitiesChanged { .. })
    })
    .await;
    assert!(changed.is_some(), "tools/list_changed should reach the bus");

    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    loop {
        let status = supervisor.status(alpha.id).unwrap();
        if status.capability_count == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "capabilities were not refreshed"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    supervisor.shutdown().await;
    listener.abort();
    server.stop();
}
