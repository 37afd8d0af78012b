//! Mock implementations for testing
//!
//! - `MockServerRepository`: in-memory `ServerRepository`
//! - `ScriptedConnector`: per-URL scripted connection outcomes with an
//!   observable call log

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use mcplink_core::{
    CapabilityDescriptor, ConnectionError, ConnectionErrorKind, DeleteOutcome, RepoResult,
    SaveOutcome, ServerRecord, ServerRepository, StatusUpdate,
};
use mcplink_gateway::{ConnectTarget, Connector, LiveConnection};

// ============================================================================
// MockServerRepository
// ============================================================================

#[derive(Default)]
pub struct MockServerRepository {
    servers: Mutex<HashMap<Uuid, ServerRecord>>,
}

impl MockServerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, bypassing the registry
    pub fn with_server(self, record: ServerRecord) -> Self {
        self.servers.lock().insert(record.id, record);
        self
    }

    /// Current copy of a record
    pub fn snapshot(&self, id: &Uuid) -> Option<ServerRecord> {
        self.servers.lock().get(id).cloned()
    }
}

#[async_trait]
impl ServerRepository for MockServerRepository {
    async fn list(&self) -> RepoResult<Vec<ServerRecord>> {
        let mut servers: Vec<ServerRecord> = self.servers.lock().values().cloned().collect();
        servers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
        Ok(servers)
    }

    async fn get(&self, id: &Uuid) -> RepoResult<Option<ServerRecord>> {
        Ok(self.servers.lock().get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> RepoResult<Option<ServerRecord>> {
        Ok(self
            .servers
            .lock()
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn get_active(&self) -> RepoResult<Option<ServerRecord>> {
        Ok(self.servers.lock().values().find(|s| s.active).cloned())
    }

    async fn insert_or_update(&self, record: &ServerRecord) -> RepoResult<SaveOutcome> {
        let mut servers = self.servers.lock();
        if servers
            .values()
            .any(|s| s.name == record.name && s.id != record.id)
        {
            return Ok(SaveOutcome::DuplicateName);
        }

        match servers.get_mut(&record.id) {
            Some(existing) => {
                existing.name = record.name.clone();
                existing.endpoint_url = record.endpoint_url.clone();
                existing.encrypted_credential = record.encrypted_credential.clone();
                existing.description = record.description.clone();
                existing.updated_at = Utc::now();
            }
            None => {
                servers.insert(record.id, record.clone());
            }
        }
        Ok(SaveOutcome::Saved)
    }

    async fn delete(&self, id: &Uuid) -> RepoResult<DeleteOutcome> {
        let mut servers = self.servers.lock();
        Ok(match servers.get(id) {
            None => DeleteOutcome::NotFound,
            Some(server) if server.active => DeleteOutcome::Active,
            Some(_) => {
                servers.remove(id);
                DeleteOutcome::Deleted
            }
        })
    }

    async fn activate_exclusive(&self, id: &Uuid) -> RepoResult<bool> {
        let mut servers = self.servers.lock();
        if !servers.contains_key(id) {
            return Ok(false);
        }
        for server in servers.values_mut() {
            server.active = server.id == *id;
        }
        Ok(true)
    }

    async fn deactivate_all(&self) -> RepoResult<()> {
        for server in self.servers.lock().values_mut() {
            server.active = false;
        }
        Ok(())
    }

    async fn update_status(&self, id: &Uuid, update: &StatusUpdate) -> RepoResult<()> {
        if let Some(server) = self.servers.lock().get_mut(id) {
            server.status = update.status;
            server.status_message = update.message.clone();
            server.capability_count = update.capability_count;
            server.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_connected(&self, id: &Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        if let Some(server) = self.servers.lock().get_mut(id) {
            server.last_connected_at = Some(at);
        }
        Ok(())
    }

    async fn mark_tested(&self, id: &Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        if let Some(server) = self.servers.lock().get_mut(id) {
            server.last_tested_at = Some(at);
        }
        Ok(())
    }

    async fn count(&self) -> RepoResult<usize> {
        Ok(self.servers.lock().len())
    }
}

// ============================================================================
// ScriptedConnector
// ============================================================================

/// Outcome of one connection attempt
#[derive(Debug, Clone)]
pub enum Script {
    /// Handshake succeeds and the listing returns these capabilities
    Succeed(Vec<CapabilityDescriptor>),
    /// Handshake fails
    Fail(ConnectionError),
    /// Handshake succeeds, the first listing fails
    FailListing(ConnectionError),
    /// Wait, then behave like the inner script
    Delayed(Duration, Box<Script>),
}

impl Script {
    pub fn succeed(names: &[&str]) -> Self {
        Script::Succeed(
            names
                .iter()
                .map(|n| CapabilityDescriptor::new(*n, Some(format!("Test tool: {}", n))))
                .collect(),
        )
    }

    pub fn refused() -> Self {
        Script::Fail(ConnectionError::new(
            ConnectionErrorKind::Refused,
            "Connection refused",
        ))
    }

    pub fn rejected_credential() -> Self {
        Script::Fail(ConnectionError::new(
            ConnectionErrorKind::InvalidCredential,
            "HTTP status client error (401 Unauthorized)",
        ))
    }

    pub fn delayed(delay: Duration, inner: Script) -> Self {
        Script::Delayed(delay, Box::new(inner))
    }
}

/// One recorded call to `connect`
#[derive(Debug, Clone)]
pub struct ConnectCall {
    pub server_id: Option<Uuid>,
    pub server_name: String,
    pub url: String,
    pub credential: String,
    pub at: Instant,
}

/// Connector whose behaviour per URL is scripted.
///
/// Each URL has a queue of outcomes; the last one repeats. Unknown URLs
/// are refused.
#[derive(Default)]
pub struct ScriptedConnector {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    calls: Mutex<Vec<ConnectCall>>,
    connections: Mutex<Vec<Arc<ScriptedConnection>>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the script for `url` with a single repeating outcome
    pub fn set(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .insert(url.to_string(), VecDeque::from([script]));
    }

    /// Queue outcomes for `url`; the last one repeats
    pub fn push(&self, url: &str, script: Script) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    fn next_script(&self, url: &str) -> Script {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(Script::refused),
            Some(queue) => queue.front().cloned().unwrap_or_else(Script::refused),
            None => Script::refused(),
        }
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<ConnectCall> {
        self.calls.lock().clone()
    }

    /// Calls made for one URL
    pub fn calls_for(&self, url: &str) -> Vec<ConnectCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.url == url)
            .cloned()
            .collect()
    }

    /// Gaps between consecutive calls for one URL
    pub fn gaps_for(&self, url: &str) -> Vec<Duration> {
        self.calls_for(url)
            .windows(2)
            .map(|w| w[1].at.duration_since(w[0].at))
            .collect()
    }

    /// Every connection handed out, in order
    pub fn connections(&self) -> Vec<Arc<ScriptedConnection>> {
        self.connections.lock().clone()
    }

    /// Connections that have not been closed
    pub fn open_connections(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Arc<dyn LiveConnection>, ConnectionError> {
        self.calls.lock().push(ConnectCall {
            server_id: target.server_id,
            server_name: target.server_name.clone(),
            url: target.url.clone(),
            credential: target.credential.to_string(),
            at: Instant::now(),
        });

        let mut script = self.next_script(&target.url);
        let script = loop {
            match script {
                Script::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    script = *inner;
                }
                other => break other,
            }
        };

        let connection = match script {
            Script::Succeed(capabilities) => ScriptedConnection::new(target.url.clone(), capabilities),
            Script::FailListing(err) => {
                let connection = ScriptedConnection::new(target.url.clone(), Vec::new());
                connection.fail_next_listing(err);
                connection
            }
            Script::Fail(err) => return Err(err),
            Script::Delayed(..) => unreachable!("delays are unwrapped above"),
        };

        let connection = Arc::new(connection);
        self.connections.lock().push(Arc::clone(&connection));
        Ok(connection)
    }
}

/// Live connection handed out by `ScriptedConnector`
pub struct ScriptedConnection {
    pub url: String,
    capabilities: Mutex<Vec<CapabilityDescriptor>>,
    listing_error: Mutex<Option<ConnectionError>>,
    list_calls: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedConnection {
    fn new(url: String, capabilities: Vec<CapabilityDescriptor>) -> Self {
        Self {
            url,
            capabilities: Mutex::new(capabilities),
            listing_error: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Change what the server reports from now on
    pub fn set_capabilities(&self, names: &[&str]) {
        *self.capabilities.lock() = names
            .iter()
            .map(|n| CapabilityDescriptor::new(*n, None))
            .collect();
    }

    /// Make the next listing fail
    pub fn fail_next_listing(&self, err: ConnectionError) {
        *self.listing_error.lock() = Some(err);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveConnection for ScriptedConnection {
    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, ConnectionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(ConnectionError::new(
                ConnectionErrorKind::ChannelClosed,
                "Connection closed",
            ));
        }
        if let Some(err) = self.listing_error.lock().take() {
            return Err(err);
        }
        Ok(self.capabilities.lock().clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
