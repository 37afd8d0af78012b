//! ServerRecord entity - persisted configuration of a remote tool server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted connection status of a server record.
///
/// Written by the supervisor (connect outcome) and by the tester
/// (successful probes). Values match database storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Never connected, or not connected since the last change
    #[default]
    Disconnected,
    /// Last connection attempt or probe succeeded
    Connected,
    /// Last connection attempt failed
    Error,
}

impl ServerStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Parse from the database representation.
    ///
    /// Unknown values fall back to `Disconnected`.
    pub fn parse(s: &str) -> Self {
        match s {
            "connected" => Self::Connected,
            "error" => Self::Error,
            _ => Self::Disconnected,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server record - configuration of one remote tool server.
///
/// The credential is stored encrypted; only the supervisor and the tester
/// ever decrypt it, immediately before opening a connection. The ciphertext
/// is never serialized out of the process, use [`ServerView`] for that.
///
/// At most one record in the store has `active = true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Stable unique identifier
    pub id: Uuid,

    /// Unique human-readable name (case-sensitive)
    pub name: String,

    /// Base URL of the remote server
    pub endpoint_url: String,

    /// Encrypted credential blob (empty when no credential is configured)
    #[serde(skip_serializing, default)]
    pub encrypted_credential: String,

    /// Whether this is the active server
    pub active: bool,

    /// Last known connection status
    pub status: ServerStatus,

    /// Human-readable detail for `status`
    pub status_message: Option<String>,

    /// Number of capabilities discovered on the last successful connect/probe
    pub capability_count: u32,

    /// Free-form operator description
    pub description: Option<String>,

    /// When the tester last probed this server
    pub last_tested_at: Option<DateTime<Utc>>,

    /// When the supervisor last connected to this server
    pub last_connected_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ServerRecord {
    /// Create a new, inactive and disconnected record.
    pub fn new(
        name: impl Into<String>,
        endpoint_url: impl Into<String>,
        encrypted_credential: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            endpoint_url: endpoint_url.into(),
            encrypted_credential: encrypted_credential.into(),
            active: false,
            status: ServerStatus::Disconnected,
            status_message: None,
            capability_count: 0,
            description: None,
            last_tested_at: None,
            last_connected_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Whether a credential is stored
    pub fn has_credential(&self) -> bool {
        !self.encrypted_credential.is_empty()
    }
}

/// Sanitized projection of a [`ServerRecord`] for administrative output.
///
/// Never carries the ciphertext, only whether one is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerView {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub active: bool,
    pub status: ServerStatus,
    pub status_message: Option<String>,
    pub capability_count: u32,
    pub has_credential: bool,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ServerRecord> for ServerView {
    fn from(record: &ServerRecord) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            url: record.endpoint_url.clone(),
            description: record.description.clone(),
            active: record.active,
            status: record.status,
            status_message: record.status_message.clone(),
            capability_count: record.capability_count,
            has_credential: record.has_credential(),
            last_tested_at: record.last_tested_at,
            last_connected_at: record.last_connected_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<ServerRecord> for ServerView {
    fn from(record: ServerRecord) -> Self {
        Self::from(&record)
    }
}

/// Narrow status write issued by the supervisor and the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ServerStatus,
    pub message: Option<String>,
    pub capability_count: u32,
}

impl StatusUpdate {
    /// Successful connection with the given capability count
    pub fn connected(message: impl Into<String>, capability_count: u32) -> Self {
        Self {
            status: ServerStatus::Connected,
            message: Some(message.into()),
            capability_count,
        }
    }

    /// Connection closed on purpose (disable, swap, shutdown)
    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            status: ServerStatus::Disconnected,
            message: Some(message.into()),
            capability_count: 0,
        }
    }

    /// Failed connection
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ServerStatus::Error,
            message: Some(message.into()),
            capability_count: 0,
        }
    }
}
