//! Application wiring
//!
//! Builds the vault, storage, registry, supervisor, cache and tester, and
//! owns their lifetimes.

use std::sync::Arc;

use anyhow::Context;
use mcplink_core::{EventBus, NewServer, RegistryError, ServerRegistry, ServerRepository};
use mcplink_gateway::{
    CapabilityCache, ConnectionSupervisor, ConnectionTester, Connector, HttpConnector,
};
use mcplink_storage::{CredentialVault, Database, SqliteServerRepository};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BootstrapServer, DaemonConfig};

pub struct App {
    pub registry: Arc<ServerRegistry>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub cache: Arc<CapabilityCache>,
    pub tester: Arc<ConnectionTester>,
    event_bus: EventBus,
    listener: Option<JoinHandle<()>>,
    warm_up: Option<JoinHandle<()>>,
    config: DaemonConfig,
}

impl App {
    /// Open storage and construct every component. Nothing connects yet.
    pub fn build(config: DaemonConfig) -> anyhow::Result<Self> {
        let vault = CredentialVault::from_base64_key(config.encryption_key.as_deref())
            .context("Invalid MCPLINK_ENCRYPTION_KEY")?;
        debug!(key_source = ?vault.key_source(), "Credential vault ready");
        let vault = Arc::new(vault);

        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        info!("Opening database at {:?}", config.database_path);
        let db = Database::open(&config.database_path)?;
        let db = Arc::new(Mutex::new(db));

        let repo: Arc<dyn ServerRepository> = Arc::new(SqliteServerRepository::new(db));
        let event_bus = EventBus::new();

        let registry = Arc::new(ServerRegistry::new(
            repo.clone(),
            vault.clone(),
            event_bus.sender(),
        ));

        let connector: Arc<dyn Connector> = Arc::new(
            HttpConnector::new(config.transport.clone()).with_event_sender(event_bus.sender()),
        );

        let supervisor = Arc::new(ConnectionSupervisor::new(
            repo.clone(),
            vault.clone(),
            connector.clone(),
            event_bus.sender(),
        ));
        let cache = Arc::new(CapabilityCache::new(supervisor.clone()));
        let tester = Arc::new(ConnectionTester::new(repo, vault, connector));

        Ok(Self {
            registry,
            supervisor,
            cache,
            tester,
            event_bus,
            listener: None,
            warm_up: None,
            config,
        })
    }

    /// Bootstrap, start listening for events, begin supervision, and
    /// schedule the cache warm-up.
    ///
    /// Returns without waiting for the remote server.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if let Some(bootstrap) = self.config.bootstrap.clone() {
            self.bootstrap(&bootstrap).await?;
        }

        self.listener = Some(
            self.supervisor
                .spawn_event_listener(self.event_bus.subscribe()),
        );
        self.supervisor.initialize().await?;
        self.warm_up = Some(self.cache.spawn_warm_up(self.config.warmup_delay));

        Ok(())
    }

    /// Create and activate the configured server unless one with its name
    /// already exists.
    async fn bootstrap(&self, bootstrap: &BootstrapServer) -> Result<(), RegistryError> {
        if self.registry.find_by_name(&bootstrap.name).await?.is_some() {
            info!(name = %bootstrap.name, "Bootstrap server already registered");
            return Ok(());
        }

        let record = self
            .registry
            .create(NewServer::new(
                &bootstrap.name,
                &bootstrap.url,
                &bootstrap.api_key,
            ))
            .await?;
        self.registry.activate(record.id).await?;

        info!(server_id = %record.id, name = %record.name, "Registered bootstrap server");
        Ok(())
    }

    /// One-line operator summary
    pub async fn status_line(&self) -> String {
        let servers = self.registry.count().await.unwrap_or(0);
        let active = match self.registry.find_active().await {
            Ok(Some(record)) => record.name,
            Ok(None) => "none".to_string(),
            Err(e) => {
                warn!("Failed to load active server: {}", e);
                "unknown".to_string()
            }
        };
        format!(
            "servers={} active={} {}",
            servers,
            active,
            self.supervisor.status_report()
        )
    }

    pub async fn shutdown(&mut self) {
        if let Some(warm_up) = self.warm_up.take() {
            warm_up.abort();
        }
        self.supervisor.shutdown().await;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}
