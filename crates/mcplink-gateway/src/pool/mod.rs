//! Connection pool - lifecycle of the connection to the active server
//!
//! - **ConnectionSupervisor**: connect, retry with backoff, enable/disable
//! - **CapabilityCache**: TTL cache over the live connection's capabilities
//! - **ConnectionTester**: one-shot probes outside supervision
//! - **transport**: `Connector` / `LiveConnection` and the HTTP implementation

mod backoff;
mod capability_cache;
mod instance;
mod supervisor;
mod tester;
pub mod transport;

pub use backoff::RetryPolicy;
pub use capability_cache::{CacheTtl, CapabilityCache, CapabilitySource};
pub use instance::{McpClient, McpClientHandler};
pub use supervisor::{ConnectionSupervisor, StatusReport, MAX_RETRIES_EXCEEDED};
pub use tester::ConnectionTester;
pub use transport::{
    ConnectTarget, Connector, HttpConnection, HttpConnector, LiveConnection, TransportConfig,
    DEFAULT_AUTH_HEADER, DEFAULT_CLIENT_NAME, DEFAULT_MCP_ENDPOINT, DEFAULT_REQUEST_TIMEOUT,
};
