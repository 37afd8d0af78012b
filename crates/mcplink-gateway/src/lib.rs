//! McpLink Gateway
//!
//! Keeps at most one live connection to the active remote tool server:
//! - Connection supervision with bounded exponential backoff
//! - Time-bounded capability cache over the live connection
//! - One-shot connection probes for stored and unsaved servers
//! - Streamable HTTP transport with header-based credentials

pub mod pool;

pub use pool::{
    // Supervision
    ConnectionSupervisor, RetryPolicy, StatusReport, MAX_RETRIES_EXCEEDED,
    // Capabilities
    CacheTtl, CapabilityCache, CapabilitySource,
    // Probes
    ConnectionTester,
    // Transport
    ConnectTarget, Connector, HttpConnection, HttpConnector, LiveConnection, McpClient,
    McpClientHandler, TransportConfig,
};
