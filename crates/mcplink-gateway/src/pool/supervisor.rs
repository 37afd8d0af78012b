//! ConnectionSupervisor - lifecycle of the live connection to the active server
//!
//! ```text
//!            success                     failure
//! Connecting ───────▶ Active ─────────────────────▶ Error
//!     ▲                                              │
//!     └──────── backoff timer (retry < max) ─────────┘
//!
//! any ── disable ──▶ Disabled ── enable ──▶ Connecting
//! ```
//!
//! Race condition prevention:
//! - flow_id: taken from a global monotonic counter on every state-changing
//!   operation. Attempt results and timers carry the flow_id they started
//!   with and are dropped when it no longer matches.
//! - DashMap guards are never held across an `.await`.
//! - swap_lock serializes activation changes, so at most one server is
//!   supervised at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcplink_core::{
    CapabilityDescriptor, ConnectionError, ConnectionState, ConnectionStatus, DomainEvent,
    EventReceiver, EventSender, SecretCipher, ServerRecord, ServerRepository, StatusUpdate,
    SupervisorError,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::RetryPolicy;
use super::capability_cache::CapabilitySource;
use super::transport::{ConnectTarget, Connector, LiveConnection};

/// Message persisted once automatic retries are exhausted
pub const MAX_RETRIES_EXCEEDED: &str = "Max retry attempts exceeded";

/// Runtime status plus the flow that owns it
struct TrackedServer {
    status: ConnectionStatus,
    flow_id: u64,
}

/// Pending timer or attempt task for one server
struct PendingTask {
    token: u64,
    handle: JoinHandle<()>,
}

/// Aggregate view of everything the supervisor tracks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub tracked: usize,
    pub active: usize,
    pub connecting: usize,
    pub error: usize,
    pub disabled: usize,
    pub capability_count: usize,
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "tracked={} active={} connecting={} error={} disabled={} capabilities={}",
            self.tracked,
            self.active,
            self.connecting,
            self.error,
            self.disabled,
            self.capability_count
        )
    }
}

/// Supervises the connection to the active server.
pub struct ConnectionSupervisor {
    repo: Arc<dyn ServerRepository>,
    cipher: Arc<dyn SecretCipher>,
    connector: Arc<dyn Connector>,
    retry_policy: RetryPolicy,
    event_sender: EventSender,
    /// Runtime status per tracked server
    statuses: DashMap<Uuid, TrackedServer>,
    /// Live handles; presence implies `Active`
    handles: DashMap<Uuid, Arc<dyn LiveConnection>>,
    /// At most one pending timer/attempt per server
    tasks: DashMap<Uuid, PendingTask>,
    flow_seq: AtomicU64,
    task_seq: AtomicU64,
    /// Bumped whenever the set of live capabilities may have changed
    generation: AtomicU64,
    swap_lock: tokio::sync::Mutex<()>,
    shutting_down: AtomicBool,
}

impl ConnectionSupervisor {
    pub fn new(
        repo: Arc<dyn ServerRepository>,
        cipher: Arc<dyn SecretCipher>,
        connector: Arc<dyn Connector>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            repo,
            cipher,
            connector,
            retry_policy: RetryPolicy::default(),
            event_sender,
            statuses: DashMap::new(),
            handles: DashMap::new(),
            tasks: DashMap::new(),
            flow_seq: AtomicU64::new(0),
            task_seq: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            swap_lock: tokio::sync::Mutex::new(()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn next_flow_id(&self) -> u64 {
        self.flow_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn emit_state(&self, server_id: Uuid, state: ConnectionState, message: Option<String>) {
        self.event_sender.emit(DomainEvent::ConnectionStateChanged {
            server_id,
            state,
            message,
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start supervising the active server, if there is one.
    ///
    /// Returns as soon as the first attempt is scheduled; an unreachable
    /// server never delays startup.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), SupervisorError> {
        info!("[Supervisor] Initializing");
        self.reconnect_active_server().await
    }

    /// Close everything, forget all runtime status, and start over with the
    /// currently active server.
    pub async fn reconnect_active_server(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let _swap = self.swap_lock.lock().await;

        if self.shutting_down.load(Ordering::SeqCst) {
            return Ok(());
        }

        let closed = self.close_everything().await;
        for server_id in closed {
            self.persist_status(server_id, StatusUpdate::disconnected("Connection closed"))
                .await;
        }

        let Some(record) = self.repo.get_active().await? else {
            info!("[Supervisor] No active server configured");
            return Ok(());
        };

        info!(
            server_id = %record.id,
            name = %record.name,
            "[Supervisor] Supervising active server"
        );

        let flow_id = self.next_flow_id();
        self.statuses.insert(
            record.id,
            TrackedServer {
                status: ConnectionStatus::new(record.id, record.endpoint_url.clone()),
                flow_id,
            },
        );
        self.emit_state(record.id, ConnectionState::Connecting, None);
        self.schedule(record.id, flow_id, Duration::ZERO);

        Ok(())
    }

    /// Close every live handle and forget every tracked server.
    ///
    /// Returns the ids whose handles were closed.
    async fn close_everything(&self) -> Vec<Uuid> {
        self.statuses.clear();

        let task_ids: Vec<Uuid> = self.tasks.iter().map(|e| *e.key()).collect();
        for id in task_ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                task.handle.abort();
            }
        }

        let handle_ids: Vec<Uuid> = self.handles.iter().map(|e| *e.key()).collect();
        let mut closed = Vec::with_capacity(handle_ids.len());
        for id in handle_ids {
            if let Some((_, handle)) = self.handles.remove(&id) {
                handle.close().await;
                debug!(server_id = %id, "[Supervisor] Closed live handle");
                closed.push(id);
            }
        }

        self.bump_generation();
        closed
    }

    /// Close every live handle and cancel every timer.
    pub async fn shutdown(&self) {
        info!("[Supervisor] Shutting down");
        self.shutting_down.store(true, Ordering::SeqCst);
        let _swap = self.swap_lock.lock().await;

        let closed = self.close_everything().await;
        for server_id in &closed {
            self.persist_status(*server_id, StatusUpdate::disconnected("Shut down"))
                .await;
        }

        info!(closed = closed.len(), "[Supervisor] Shutdown complete");
    }

    // ========================================================================
    // Attempts and retries
    // ========================================================================

    /// Spawn a task that waits `delay`, then attempts a connection if
    /// `flow_id` still owns the server.
    ///
    /// Replaces (and aborts) any pending task for the server.
    fn schedule(self: &Arc<Self>, server_id: Uuid, flow_id: u64, delay: Duration) {
        let token = self.task_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        let task = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // Detach before running so a follow-up schedule from inside the
            // attempt cannot abort this task
            this.tasks.remove_if(&server_id, |_, task| task.token == token);

            if !this.is_current_flow(server_id, flow_id) {
                debug!(server_id = %server_id, "[Supervisor] Dropping stale timer");
                return;
            }

            match this.repo.get(&server_id).await {
                Ok(Some(record)) if record.active => this.attempt_connection(record, flow_id).await,
                Ok(_) => {
                    info!(
                        server_id = %server_id,
                        "[Supervisor] Server no longer active, skipping attempt"
                    );
                }
                Err(e) => {
                    error!(server_id = %server_id, "[Supervisor] Failed to load server: {}", e);
                }
            }
        };

        // The entry guard is held across the spawn so the task map always
        // sees the insert before the task's own removal
        match self.tasks.entry(server_id) {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(PendingTask {
                    token,
                    handle: tokio::spawn(task),
                });
                previous.handle.abort();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingTask {
                    token,
                    handle: tokio::spawn(task),
                });
            }
        }
    }

    fn is_current_flow(&self, server_id: Uuid, flow_id: u64) -> bool {
        self.statuses
            .get(&server_id)
            .is_some_and(|t| t.flow_id == flow_id && t.status.enabled)
    }

    fn cancel_task(&self, server_id: Uuid) {
        if let Some((_, task)) = self.tasks.remove(&server_id) {
            task.handle.abort();
        }
    }

    /// Decrypt, connect, handshake, discover.
    ///
    /// Never returns an error: failures land in the server's status and the
    /// retry scheduler.
    async fn attempt_connection(self: &Arc<Self>, record: ServerRecord, flow_id: u64) {
        let server_id = record.id;

        let began = match self.statuses.get_mut(&server_id) {
            Some(mut tracked) if tracked.flow_id == flow_id && tracked.status.enabled => {
                tracked.status.mark_connecting();
                true
            }
            _ => false,
        };
        if !began {
            return;
        }

        debug!(
            server_id = %server_id,
            url = %record.endpoint_url,
            "[Supervisor] Attempting connection"
        );

        let result = self.open_and_discover(&record).await;

        match result {
            Ok((handle, capabilities)) => {
                self.complete_success(&record, flow_id, handle, capabilities)
                    .await;
            }
            Err(err) => {
                self.handle_failure(server_id, flow_id, err).await;
            }
        }
    }

    async fn open_and_discover(
        &self,
        record: &ServerRecord,
    ) -> Result<(Arc<dyn LiveConnection>, Vec<CapabilityDescriptor>), ConnectionError> {
        let credential = self.cipher.decrypt(&record.encrypted_credential)?;
        let target = ConnectTarget::new(
            Some(record.id),
            record.name.clone(),
            record.endpoint_url.clone(),
            credential,
        );

        let handle = self.connector.connect(&target).await?;

        match handle.list_capabilities().await {
            Ok(capabilities) => Ok((handle, capabilities)),
            Err(e) => {
                handle.close().await;
                Err(e)
            }
        }
    }

    async fn complete_success(
        &self,
        record: &ServerRecord,
        flow_id: u64,
        handle: Arc<dyn LiveConnection>,
        capabilities: Vec<CapabilityDescriptor>,
    ) {
        let server_id = record.id;
        let names: Vec<String> = capabilities.iter().map(|c| c.name.clone()).collect();
        let count = names.len();

        let (accepted, replaced) = match self.statuses.get_mut(&server_id) {
            Some(mut tracked) if tracked.flow_id == flow_id && tracked.status.enabled => {
                tracked.status.mark_success(names);
                let replaced = self.handles.insert(server_id, Arc::clone(&handle));
                (true, replaced)
            }
            _ => (false, None),
        };

        if let Some(old) = replaced {
            old.close().await;
        }

        if !accepted {
            debug!(server_id = %server_id, "[Supervisor] Discarding stale connection");
            handle.close().await;
            return;
        }

        self.bump_generation();

        info!(
            server_id = %server_id,
            name = %record.name,
            capabilities = count,
            "[Supervisor] Connected"
        );

        let message = format!("Connected successfully. Found {} capabilities.", count);
        self.persist_status(server_id, StatusUpdate::connected(message, count as u32))
            .await;
        if let Err(e) = self.repo.mark_connected(&server_id, Utc::now()).await {
            warn!(server_id = %server_id, "[Supervisor] Failed to persist last_connected_at: {}", e);
        }

        self.emit_state(server_id, ConnectionState::Active, None);
    }

    /// Move the server to `Error`, close any live handle, and schedule a
    /// retry when the failure is transient and attempts remain.
    async fn handle_failure(self: &Arc<Self>, server_id: Uuid, flow_id: u64, err: ConnectionError) {
        enum Next {
            Stale,
            Retry { attempt: u32, delay: Duration },
            Exhausted,
            Fatal,
        }

        let (next, removed) = match self.statuses.get_mut(&server_id) {
            Some(mut tracked) if tracked.flow_id == flow_id && tracked.status.enabled => {
                tracked.status.mark_failure(err.message.clone());
                let removed = self.handles.remove(&server_id).map(|(_, h)| h);

                let next = if !err.is_retryable() {
                    tracked.status.next_retry_at = None;
                    Next::Fatal
                } else if self.retry_policy.allows_retry(tracked.status.retry_count) {
                    let delay = self.retry_policy.delay(tracked.status.retry_count + 1);
                    let next_at = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    let attempt = tracked.status.record_retry_scheduled(next_at);
                    Next::Retry { attempt, delay }
                } else {
                    tracked.status.next_retry_at = None;
                    Next::Exhausted
                };
                (next, removed)
            }
            _ => (Next::Stale, None),
        };

        if let Some(handle) = removed {
            handle.close().await;
            self.bump_generation();
        }

        let persisted_message = match next {
            Next::Stale => {
                debug!(server_id = %server_id, "[Supervisor] Ignoring stale failure: {}", err);
                return;
            }
            Next::Retry { attempt, delay } => {
                warn!(
                    server_id = %server_id,
                    attempt,
                    max_attempts = self.retry_policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    "[Supervisor] Connection failed, retrying: {}",
                    err
                );
                self.schedule(server_id, flow_id, delay);
                err.message.clone()
            }
            Next::Exhausted => {
                error!(
                    server_id = %server_id,
                    "[Supervisor] {} ({}): {}",
                    MAX_RETRIES_EXCEEDED,
                    self.retry_policy.max_attempts,
                    err
                );
                MAX_RETRIES_EXCEEDED.to_string()
            }
            Next::Fatal => {
                error!(
                    server_id = %server_id,
                    kind = ?err.kind,
                    "[Supervisor] Non-retryable connection failure: {}",
                    err
                );
                err.message.clone()
            }
        };

        self.persist_status(server_id, StatusUpdate::error(persisted_message.clone()))
            .await;
        self.emit_state(server_id, ConnectionState::Error, Some(persisted_message));
    }

    async fn persist_status(&self, server_id: Uuid, update: StatusUpdate) {
        if let Err(e) = self.repo.update_status(&server_id, &update).await {
            warn!(server_id = %server_id, "[Supervisor] Failed to persist status: {}", e);
        }
    }

    // ========================================================================
    // Operator actions
    // ========================================================================

    /// Disable a server: close its handle, cancel its timer.
    ///
    /// Idempotent; disabling an untracked server is a no-op.
    pub async fn disable(&self, server_id: Uuid) -> Result<(), SupervisorError> {
        let flow_id = self.next_flow_id();

        let (changed, removed) = match self.statuses.get_mut(&server_id) {
            Some(mut tracked) => {
                let changed = tracked.status.state != ConnectionState::Disabled;
                tracked.flow_id = flow_id;
                tracked.status.mark_disabled();
                (changed, self.handles.remove(&server_id).map(|(_, h)| h))
            }
            None => {
                debug!(server_id = %server_id, "[Supervisor] Disable on untracked server");
                return Ok(());
            }
        };

        self.cancel_task(server_id);

        if let Some(handle) = removed {
            handle.close().await;
            self.bump_generation();
        }

        if changed {
            info!(server_id = %server_id, "[Supervisor] Disabled");
            self.persist_status(server_id, StatusUpdate::disconnected("Disabled"))
                .await;
            self.emit_state(server_id, ConnectionState::Disabled, None);
        }

        Ok(())
    }

    /// Re-enable a disabled server and attempt a connection.
    ///
    /// A no-op for servers that are not disabled. An untracked server is
    /// picked up only if it is the active one.
    pub async fn enable(self: &Arc<Self>, server_id: Uuid) -> Result<(), SupervisorError> {
        let flow_id = self.next_flow_id();

        let tracked = match self.statuses.get_mut(&server_id) {
            Some(mut tracked) => {
                if tracked.status.state != ConnectionState::Disabled {
                    debug!(server_id = %server_id, "[Supervisor] Enable on enabled server");
                    return Ok(());
                }
                tracked.flow_id = flow_id;
                tracked.status.mark_enabled();
                true
            }
            None => false,
        };

        if !tracked {
            return self.track_if_active(server_id).await;
        }

        info!(server_id = %server_id, "[Supervisor] Enabled");
        self.emit_state(server_id, ConnectionState::Connecting, None);
        self.schedule(server_id, flow_id, Duration::ZERO);
        Ok(())
    }

    /// Manual retry: reset the retry count and attempt immediately.
    ///
    /// Also reconnects an `Active` server. Disabled servers stay disabled.
    pub async fn retry(self: &Arc<Self>, server_id: Uuid) -> Result<(), SupervisorError> {
        enum Outcome {
            Untracked,
            Disabled,
            Restart(Option<Arc<dyn LiveConnection>>),
        }

        let flow_id = self.next_flow_id();

        let outcome = match self.statuses.get_mut(&server_id) {
            Some(tracked) if tracked.status.state == ConnectionState::Disabled => Outcome::Disabled,
            Some(mut tracked) => {
                tracked.flow_id = flow_id;
                tracked.status.reset_retries();
                tracked.status.mark_connecting();
                Outcome::Restart(self.handles.remove(&server_id).map(|(_, h)| h))
            }
            None => Outcome::Untracked,
        };

        let removed = match outcome {
            Outcome::Untracked => return self.track_if_active(server_id).await,
            Outcome::Disabled => {
                warn!(server_id = %server_id, "[Supervisor] Retry ignored: server is disabled");
                return Ok(());
            }
            Outcome::Restart(removed) => removed,
        };

        self.cancel_task(server_id);
        if let Some(handle) = removed {
            handle.close().await;
            self.bump_generation();
        }

        info!(server_id = %server_id, "[Supervisor] Manual retry");
        self.emit_state(server_id, ConnectionState::Connecting, None);
        self.schedule(server_id, flow_id, Duration::ZERO);
        Ok(())
    }

    /// Manual retry of whichever server is active.
    pub async fn retry_active(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let record = self
            .repo
            .get_active()
            .await?
            .ok_or(SupervisorError::NoActiveServer)?;
        self.retry(record.id).await
    }

    async fn track_if_active(self: &Arc<Self>, server_id: Uuid) -> Result<(), SupervisorError> {
        match self.repo.get_active().await? {
            Some(active) if active.id == server_id => self.reconnect_active_server().await,
            _ => Err(SupervisorError::NotTracked(server_id)),
        }
    }

    /// Re-list capabilities on the live handle.
    ///
    /// A failed listing is a connection failure: the server moves to `Error`
    /// and the retry scheduler takes over.
    pub async fn refresh_capabilities(self: &Arc<Self>, server_id: Uuid) -> Result<(), SupervisorError> {
        let handle = self
            .handles
            .get(&server_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or(SupervisorError::NotTracked(server_id))?;
        let flow_id = self
            .statuses
            .get(&server_id)
            .map(|t| t.flow_id)
            .ok_or(SupervisorError::NotTracked(server_id))?;

        match handle.list_capabilities().await {
            Ok(capabilities) => {
                let names: Vec<String> = capabilities.into_iter().map(|c| c.name).collect();
                let count = names.len();
                let updated = match self.statuses.get_mut(&server_id) {
                    Some(mut tracked)
                        if tracked.flow_id == flow_id && tracked.status.is_active() =>
                    {
                        tracked.status.update_capabilities(names);
                        true
                    }
                    _ => false,
                };
                if updated {
                    self.bump_generation();
                    info!(
                        server_id = %server_id,
                        capabilities = count,
                        "[Supervisor] Refreshed capabilities"
                    );
                    let message = format!("Connected successfully. Found {} capabilities.", count);
                    self.persist_status(server_id, StatusUpdate::connected(message, count as u32))
                        .await;
                }
            }
            Err(err) => {
                warn!(server_id = %server_id, "[Supervisor] Capability refresh failed: {}", err);
                self.handle_failure(server_id, flow_id, err).await;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of one server's runtime status
    pub fn status(&self, server_id: Uuid) -> Option<ConnectionStatus> {
        self.statuses.get(&server_id).map(|t| t.status.clone())
    }

    /// Snapshot of every tracked server's runtime status
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.iter().map(|t| t.status.clone()).collect()
    }

    pub fn status_report(&self) -> StatusReport {
        let mut report = StatusReport::default();
        for tracked in self.statuses.iter() {
            report.tracked += 1;
            report.capability_count += tracked.status.capability_count;
            match tracked.status.state {
                ConnectionState::Active => report.active += 1,
                ConnectionState::Connecting => report.connecting += 1,
                ConnectionState::Error => report.error += 1,
                ConnectionState::Disabled => report.disabled += 1,
            }
        }
        report
    }

    /// Number of open live handles
    pub fn live_handle_count(&self) -> usize {
        self.handles.len()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// React to activation changes and capability notifications.
    pub fn spawn_event_listener(self: &Arc<Self>, mut receiver: EventReceiver) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if this.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    DomainEvent::ActiveServerChanged { server_id } => {
                        info!(
                            server_id = ?server_id,
                            "[Supervisor] Active server changed, reconnecting"
                        );
                        if let Err(e) = this.reconnect_active_server().await {
                            error!("[Supervisor] Reconnect after activation change failed: {}", e);
                        }
                    }
                    DomainEvent::ServerUpdated { server_id, .. }
                        if this.statuses.contains_key(&server_id) =>
                    {
                        if let Err(e) = this.retry(server_id).await {
                            warn!(server_id = %server_id, "[Supervisor] Reconnect after update failed: {}", e);
                        }
                    }
                    DomainEvent::CapabilitiesChanged { server_id } => {
                        if let Err(e) = this.refresh_capabilities(server_id).await {
                            debug!(server_id = %server_id, "[Supervisor] Refresh skipped: {}", e);
                        }
                    }
                    _ => {}
                }
            }
            debug!("[Supervisor] Event listener stopped");
        })
    }
}

#[async_trait]
impl CapabilitySource for ConnectionSupervisor {
    async fn list_active_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, ConnectionError> {
        let handles: Vec<Arc<dyn LiveConnection>> =
            self.handles.iter().map(|h| Arc::clone(h.value())).collect();

        let mut capabilities = Vec::new();
        for handle in handles {
            capabilities.extend(handle.list_capabilities().await?);
        }
        Ok(capabilities)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
