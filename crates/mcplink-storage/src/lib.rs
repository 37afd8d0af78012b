//! McpLink Storage Layer
//!
//! SQLite database plus the credential vault.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │         ServerRegistry / ConnectionSupervisor        │
//! ├──────────────────────────────────────────────────────┤
//! │      ServerRepository trait  │  SecretCipher trait   │
//! ├──────────────────────────────┼───────────────────────┤
//! │   SqliteServerRepository     │   CredentialVault     │
//! │                              │   (AES-256-GCM)       │
//! ├──────────────────────────────┴───────────────────────┤
//! │                   Database (SQLite)                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcplink_storage::{CredentialVault, Database, SqliteServerRepository};
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! let vault = Arc::new(CredentialVault::from_base64_key(key.as_deref())?);
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let repo = Arc::new(SqliteServerRepository::new(db));
//! ```

pub mod crypto;
mod database;
mod repositories;

pub use crypto::{
    generate_master_key, generate_master_key_base64, CredentialVault, KeySource, KEY_SIZE,
};
pub use database::Database;
pub use repositories::*;

/// Default database file name.
pub const DATABASE_FILE: &str = "mcplink.db";

/// Get the default database path for the current platform.
pub fn default_database_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|p| p.join("mcplink").join(DATABASE_FILE))
}
