//! Runtime connection status - never persisted, rebuilt on process restart

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supervisor state machine states.
///
/// ```text
///            success                     failure
/// Connecting ───────▶ Active ─────────────────────▶ Error
///     ▲                                              │
///     └──────── backoff timer (retry < max) ─────────┘
///
/// any ── disable ──▶ Disabled ── enable ──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connection attempt pending or in flight
    #[default]
    Connecting,
    /// Live handle open and capabilities discovered
    Active,
    /// Last attempt failed
    Error,
    /// Disabled by an operator
    Disabled,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Error => "error",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Runtime status of one supervised server.
///
/// Owned exclusively by the connection supervisor, which keeps one instance
/// per tracked server keyed by `server_id`. Callers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub server_id: Uuid,
    pub endpoint_url: String,
    pub enabled: bool,
    pub state: ConnectionState,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Capability names in discovery order
    pub capability_names: Vec<String>,
    pub capability_count: usize,
}

impl ConnectionStatus {
    /// Fresh status for a newly tracked server, in `Connecting`.
    pub fn new(server_id: Uuid, endpoint_url: impl Into<String>) -> Self {
        Self {
            server_id,
            endpoint_url: endpoint_url.into(),
            enabled: true,
            state: ConnectionState::Connecting,
            last_success_at: None,
            last_failure_at: None,
            last_error_message: None,
            retry_count: 0,
            next_retry_at: None,
            capability_names: Vec::new(),
            capability_count: 0,
        }
    }

    /// Enter `Connecting` for a new attempt
    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.next_retry_at = None;
    }

    /// Handshake and discovery succeeded
    pub fn mark_success(&mut self, capability_names: Vec<String>) {
        self.state = ConnectionState::Active;
        self.last_success_at = Some(Utc::now());
        self.last_error_message = None;
        self.retry_count = 0;
        self.next_retry_at = None;
        self.update_capabilities(capability_names);
    }

    /// An attempt (or a refresh of a live connection) failed
    pub fn mark_failure(&mut self, message: impl Into<String>) {
        self.state = ConnectionState::Error;
        self.last_failure_at = Some(Utc::now());
        self.last_error_message = Some(message.into());
        self.update_capabilities(Vec::new());
    }

    /// Operator disabled the server
    pub fn mark_disabled(&mut self) {
        self.state = ConnectionState::Disabled;
        self.enabled = false;
        self.next_retry_at = None;
        self.update_capabilities(Vec::new());
    }

    /// Operator re-enabled the server
    pub fn mark_enabled(&mut self) {
        self.enabled = true;
        self.retry_count = 0;
        self.mark_connecting();
    }

    /// Record that a retry was scheduled.
    ///
    /// Returns the new retry count. Only counts while `Connecting` or `Error`.
    pub fn record_retry_scheduled(&mut self, next_retry_at: DateTime<Utc>) -> u32 {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Error
        ) {
            self.retry_count += 1;
            self.next_retry_at = Some(next_retry_at);
        }
        self.retry_count
    }

    /// Manual retry: forget previous attempts
    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
        self.next_retry_at = None;
    }

    /// Replace the discovered capability names
    pub fn update_capabilities(&mut self, capability_names: Vec<String>) {
        self.capability_count = capability_names.len();
        self.capability_names = capability_names;
    }

    /// Whether the state is `Active`
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }
}
