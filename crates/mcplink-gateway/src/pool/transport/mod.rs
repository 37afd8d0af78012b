//! Transport abstraction for remote tool servers
//!
//! The supervisor and the tester only see [`Connector`] and
//! [`LiveConnection`]; the Streamable HTTP implementation lives in `http`.
//! Tests substitute scripted connectors.

mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcplink_core::{CapabilityDescriptor, ConnectionError};
use uuid::Uuid;
use zeroize::Zeroizing;

pub use http::{HttpConnection, HttpConnector};

/// Default per-call timeout for handshake and discovery
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Default path appended to a server's base URL
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";

/// Default header carrying the credential
pub const DEFAULT_AUTH_HEADER: &str = "X-API-Key";

/// Default client name announced in the handshake
pub const DEFAULT_CLIENT_NAME: &str = "McpLink";

/// Transport settings shared by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Bound on each remote call (handshake, capability listing)
    pub request_timeout: Duration,
    /// Path appended to the base URL unless already present
    pub mcp_endpoint: String,
    /// Header that carries the decrypted credential
    pub auth_header: String,
    /// Prefix of the client identity sent during the handshake
    pub client_name: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }
}

impl TransportConfig {
    /// Full endpoint URL for a server's base URL.
    ///
    /// Appends `mcp_endpoint` unless the URL already ends with it.
    pub fn endpoint_url(&self, base_url: &str) -> String {
        let endpoint = self.mcp_endpoint.trim_end_matches('/');
        let base = base_url.trim_end_matches('/');
        if endpoint.is_empty() || base.ends_with(endpoint) {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    /// Client identity announced to the remote server
    pub fn client_identity(&self, server_name: &str) -> String {
        format!("{} - {}", self.client_name, server_name)
    }
}

/// Everything needed to open one connection.
///
/// The credential is plaintext and wiped on drop.
pub struct ConnectTarget {
    /// `None` for unsaved candidates probed by the tester
    pub server_id: Option<Uuid>,
    pub server_name: String,
    pub url: String,
    pub credential: Zeroizing<String>,
}

impl ConnectTarget {
    pub fn new(
        server_id: Option<Uuid>,
        server_name: impl Into<String>,
        url: impl Into<String>,
        credential: String,
    ) -> Self {
        Self {
            server_id,
            server_name: server_name.into(),
            url: url.into(),
            credential: Zeroizing::new(credential),
        }
    }
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("server_id", &self.server_id)
            .field("server_name", &self.server_name)
            .field("url", &self.url)
            .field("has_credential", &!self.credential.is_empty())
            .finish()
    }
}

/// Opens initialized connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport and complete the protocol handshake
    async fn connect(&self, target: &ConnectTarget)
        -> Result<Arc<dyn LiveConnection>, ConnectionError>;
}

/// An open, initialized connection to a remote tool server.
#[async_trait]
pub trait LiveConnection: Send + Sync {
    /// List every capability the server offers, in server order
    async fn list_capabilities(&self) -> Result<Vec<CapabilityDescriptor>, ConnectionError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);
}
