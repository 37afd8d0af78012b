//! McpLink daemon
//!
//! Hosts the registry, supervisor, capability cache and tester in one
//! process, configured from the environment.

pub mod app;
pub mod config;
pub mod logging;

pub use app::App;
pub use config::{BootstrapServer, DaemonConfig};
