//! Domain events
//!
//! Emitted by the registry and the supervisor, consumed by the supervisor's
//! event listener and by whatever the host process wires up (logging, UI).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConnectionState;

/// Everything that happens to server records and their connections.
///
/// Events serialize with a `type` field containing the snake_case variant name:
/// ```json
/// { "type": "active_server_changed", "server_id": "..." }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A server record was created
    ServerCreated { server_id: Uuid, name: String },

    /// A server record was updated (name, url, credential or description)
    ServerUpdated { server_id: Uuid, name: String },

    /// A server record was deleted
    ServerDeleted { server_id: Uuid },

    /// The active designation moved. `None` means no server is active.
    ActiveServerChanged {
        #[serde(skip_serializing_if = "Option::is_none")]
        server_id: Option<Uuid>,
    },

    /// The supervisor moved a connection to a new state
    ConnectionStateChanged {
        server_id: Uuid,
        state: ConnectionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// A remote server announced its capability list changed
    CapabilitiesChanged { server_id: Uuid },
}

impl DomainEvent {
    /// Get the event type name (for logging and filtering)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ServerCreated { .. } => "server_created",
            Self::ServerUpdated { .. } => "server_updated",
            Self::ServerDeleted { .. } => "server_deleted",
            Self::ActiveServerChanged { .. } => "active_server_changed",
            Self::ConnectionStateChanged { .. } => "connection_state_changed",
            Self::CapabilitiesChanged { .. } => "capabilities_changed",
        }
    }

    /// Get the server id if this event is server-scoped
    pub fn server_id(&self) -> Option<Uuid> {
        match self {
            Self::ServerCreated { server_id, .. }
            | Self::ServerUpdated { server_id, .. }
            | Self::ServerDeleted { server_id }
            | Self::ConnectionStateChanged { server_id, .. }
            | Self::CapabilitiesChanged { server_id } => Some(*server_id),
            Self::ActiveServerChanged { server_id } => *server_id,
        }
    }

    /// Whether the event can change the set of capabilities on offer
    pub fn affects_capabilities(&self) -> bool {
        matches!(
            self,
            Self::ActiveServerChanged { .. }
                | Self::ConnectionStateChanged { .. }
                | Self::CapabilitiesChanged { .. }
        )
    }
}
