//! Daemon configuration from the environment

use std::path::PathBuf;
use std::time::Duration;

use mcplink_gateway::TransportConfig;

pub const ENV_DATABASE_PATH: &str = "MCPLINK_DATABASE_PATH";
pub const ENV_ENCRYPTION_KEY: &str = "MCPLINK_ENCRYPTION_KEY";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "MCPLINK_REQUEST_TIMEOUT_SECS";
pub const ENV_MCP_ENDPOINT: &str = "MCPLINK_MCP_ENDPOINT";
pub const ENV_AUTH_HEADER: &str = "MCPLINK_AUTH_HEADER";
pub const ENV_CLIENT_NAME: &str = "MCPLINK_CLIENT_NAME";
pub const ENV_WARMUP_DELAY_SECS: &str = "MCPLINK_WARMUP_DELAY_SECS";
pub const ENV_LOG_DIR: &str = "MCPLINK_LOG_DIR";
pub const ENV_BOOTSTRAP_NAME: &str = "MCPLINK_BOOTSTRAP_NAME";
pub const ENV_BOOTSTRAP_URL: &str = "MCPLINK_BOOTSTRAP_URL";
pub const ENV_BOOTSTRAP_API_KEY: &str = "MCPLINK_BOOTSTRAP_API_KEY";

const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(2);
const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Server created and activated at startup when no server has its name
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapServer {
    pub name: String,
    pub url: String,
    pub api_key: String,
}

impl std::fmt::Debug for BootstrapServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapServer")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    /// Base64 master key; `None` means an ephemeral key
    pub encryption_key: Option<String>,
    pub transport: TransportConfig,
    pub warmup_delay: Duration,
    pub bootstrap: Option<BootstrapServer>,
}

impl std::fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("database_path", &self.database_path)
            .field("log_dir", &self.log_dir)
            .field("has_encryption_key", &self.encryption_key.is_some())
            .field("transport", &self.transport)
            .field("warmup_delay", &self.warmup_delay)
            .field("bootstrap", &self.bootstrap)
            .finish()
    }
}

/// Base directory for the database and logs
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mcplink")
}

impl DaemonConfig {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    ///
    /// Blank values count as unset. Malformed numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = data_dir();
        let defaults = TransportConfig::default();

        let request_timeout = get(ENV_REQUEST_TIMEOUT_SECS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| {
                Duration::from_secs(secs.clamp(MIN_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS))
            })
            .unwrap_or(defaults.request_timeout);

        let transport = TransportConfig {
            request_timeout,
            mcp_endpoint: get(ENV_MCP_ENDPOINT).unwrap_or(defaults.mcp_endpoint),
            auth_header: get(ENV_AUTH_HEADER).unwrap_or(defaults.auth_header),
            client_name: get(ENV_CLIENT_NAME).unwrap_or(defaults.client_name),
        };

        let warmup_delay = get(ENV_WARMUP_DELAY_SECS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WARMUP_DELAY);

        let bootstrap = match (get(ENV_BOOTSTRAP_NAME), get(ENV_BOOTSTRAP_URL)) {
            (Some(name), Some(url)) => Some(BootstrapServer {
                name,
                url,
                api_key: get(ENV_BOOTSTRAP_API_KEY).unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            database_path: get(ENV_DATABASE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join(mcplink_storage::DATABASE_FILE)),
            log_dir: get(ENV_LOG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("logs")),
            encryption_key: get(ENV_ENCRYPTION_KEY),
            transport,
            warmup_delay,
            bootstrap,
        }
    }
}
