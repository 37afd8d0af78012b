//! Supervisor test harness
//!
//! Wires a registry and a supervisor over the in-memory repository, a real
//! vault and a scripted connector.

use std::sync::Arc;

use mcplink_core::{EventBus, EventReceiver, NewServer, ServerRecord, ServerRegistry};
use mcplink_gateway::{
    CapabilityCache, ConnectionSupervisor, ConnectionTester, Connector,
};
use mcplink_storage::CredentialVault;
use tokio::task::JoinHandle;

use crate::fixtures::test_vault;
use crate::mocks::{MockServerRepository, ScriptedConnector};

pub struct SupervisorHarness {
    pub repo: Arc<MockServerRepository>,
    pub vault: Arc<CredentialVault>,
    pub connector: Arc<ScriptedConnector>,
    pub bus: EventBus,
    pub registry: Arc<ServerRegistry>,
    pub supervisor: Arc<ConnectionSupervisor>,
    listener: Option<JoinHandle<()>>,
}

impl SupervisorHarness {
    pub fn new() -> Self {
        Self::with_repository(MockServerRepository::new())
    }

    pub fn with_repository(repo: MockServerRepository) -> Self {
        let repo = Arc::new(repo);
        let vault = test_vault();
        let connector = Arc::new(ScriptedConnector::new());
        let bus = EventBus::new();

        let registry = Arc::new(ServerRegistry::new(
            repo.clone(),
            vault.clone(),
            bus.sender(),
        ));
        let supervisor = Arc::new(ConnectionSupervisor::new(
            repo.clone(),
            vault.clone(),
            connector.clone(),
            bus.sender(),
        ));

        Self {
            repo,
            vault,
            connector,
            bus,
            registry,
            supervisor,
            listener: None,
        }
    }

    /// Route registry events to the supervisor
    pub fn start_listener(&mut self) {
        self.listener = Some(self.supervisor.spawn_event_listener(self.bus.subscribe()));
    }

    /// Subscribe before triggering the events you want to observe
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    pub fn cache(&self) -> CapabilityCache {
        CapabilityCache::new(self.supervisor.clone())
    }

    pub fn tester(&self) -> ConnectionTester {
        let connector: Arc<dyn Connector> = self.connector.clone();
        ConnectionTester::new(self.repo.clone(), self.vault.clone(), connector)
    }

    /// Register an inactive server
    pub async fn add_server(&self, name: &str, url: &str, credential: &str) -> ServerRecord {
        self.registry
            .create(NewServer::new(name, url, credential))
            .await
            .expect("Failed to create server")
    }

    /// Register a server and make it active
    pub async fn add_active_server(&self, name: &str, url: &str, credential: &str) -> ServerRecord {
        let record = self.add_server(name, url, credential).await;
        self.registry
            .activate(record.id)
            .await
            .expect("Failed to activate server")
    }
}

impl Default for SupervisorHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SupervisorHarness {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
