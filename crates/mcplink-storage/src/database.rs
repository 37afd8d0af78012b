//! SQLite database handle and schema migrations.
//!
//! Credentials are encrypted by the credential vault before they reach
//! this layer; the database itself is plain SQLite.
//!
//! Migrations live in `migrations/NNN_name.sql` and are listed in
//! [`MIGRATIONS`]. Each one runs in its own transaction together with the
//! row that records it in `schema_version`, so a failed migration leaves
//! no trace.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

/// One numbered schema change
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Schema changes in ascending version order
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial",
    sql: include_str!("migrations/001_initial.sql"),
}];

/// SQLite database wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and bring its
    /// schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!(path = ?path, "Opened database");

        Self::with_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn };
        db.apply_migrations(MIGRATIONS)?;
        Ok(db)
    }

    fn apply_migrations(&self, migrations: &[Migration]) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let current = self.schema_version();
        let pending: Vec<&Migration> = migrations.iter().filter(|m| m.version > current).collect();
        if pending.is_empty() {
            debug!(version = current, "Schema is up to date");
            return Ok(());
        }

        for migration in pending {
            let tx = self.conn.unchecked_transaction()?;
            tx.execute_batch(migration.sql).with_context(|| {
                format!(
                    "Schema migration {:03}_{} could not be applied",
                    migration.version, migration.name
                )
            })?;
            tx.execute(
                "INSERT INTO schema_version (version, name, applied_at)
                 VALUES (?1, ?2, datetime('now'))",
                params![migration.version, migration.name],
            )?;
            tx.commit()?;

            info!(
                version = migration.version,
                name = migration.name,
                "Applied schema migration"
            );
        }

        Ok(())
    }

    /// Current schema version (highest applied migration).
    pub fn schema_version(&self) -> i64 {
        self.conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0)
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
