//! SQLite implementation of ServerRepository.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mcplink_core::{
    DeleteOutcome, SaveOutcome, ServerRecord, ServerRepository, ServerStatus, StatusUpdate,
};
use rusqlite::{params, ErrorCode, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::Database;

/// SQLite-backed implementation of ServerRepository.
pub struct SqliteServerRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteServerRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// Standard column list for SELECT queries
    const SELECT_COLUMNS: &'static str =
        "id, name, endpoint_url, encrypted_credential, is_active, status, status_message,
         capability_count, description, last_tested_at, last_connected_at, created_at, updated_at";

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Parse a datetime string to DateTime<Utc>.
    /// Handles both RFC3339 format and SQLite's `datetime('now')` format.
    fn parse_datetime(s: &str) -> DateTime<Utc> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return dt.with_timezone(&Utc);
        }
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return dt.and_utc();
        }
        Utc::now()
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<ServerRecord> {
        let id: String = row.get(0)?;
        let status: String = row.get(5)?;
        let capability_count: i64 = row.get(7)?;
        let last_tested_at: Option<String> = row.get(9)?;
        let last_connected_at: Option<String> = row.get(10)?;
        let created_at: String = row.get(11)?;
        let updated_at: String = row.get(12)?;

        Ok(ServerRecord {
            id: Uuid::parse_str(&id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            name: row.get(1)?,
            endpoint_url: row.get(2)?,
            encrypted_credential: row.get(3)?,
            active: row.get::<_, i64>(4)? == 1,
            status: ServerStatus::parse(&status),
            status_message: row.get(6)?,
            capability_count: u32::try_from(capability_count).unwrap_or(0),
            description: row.get(8)?,
            last_tested_at: last_tested_at.as_deref().map(Self::parse_datetime),
            last_connected_at: last_connected_at.as_deref().map(Self::parse_datetime),
            created_at: Self::parse_datetime(&created_at),
            updated_at: Self::parse_datetime(&updated_at),
        })
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
        )
    }
}

#[async_trait]
impl ServerRepository for SqliteServerRepository {
    async fn list(&self) -> Result<Vec<ServerRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers ORDER BY created_at DESC, name ASC",
            Self::SELECT_COLUMNS
        ))?;

        let servers = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("[ServerRepository::list] Returning {} servers", servers.len());

        Ok(servers)
    }

    async fn get(&self, id: &Uuid) -> Result<Option<ServerRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers WHERE id = ?",
            Self::SELECT_COLUMNS
        ))?;

        Ok(stmt
            .query_row(params![id.to_string()], Self::map_row)
            .optional()?)
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<ServerRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers WHERE name = ?",
            Self::SELECT_COLUMNS
        ))?;

        Ok(stmt.query_row(params![name], Self::map_row).optional()?)
    }

    async fn get_active(&self) -> Result<Option<ServerRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers WHERE is_active = 1 LIMIT 1",
            Self::SELECT_COLUMNS
        ))?;

        Ok(stmt.query_row([], Self::map_row).optional()?)
    }

    /// Inserts the full record, or on an existing id updates only the
    /// operator-editable columns. `is_active` and the status columns have
    /// their own narrow writers.
    async fn insert_or_update(&self, record: &ServerRecord) -> Result<SaveOutcome> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let result = conn.execute(
            "INSERT INTO servers (id, name, endpoint_url, encrypted_credential, is_active, status,
                                  status_message, capability_count, description, last_tested_at,
                                  last_connected_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                endpoint_url = excluded.endpoint_url,
                encrypted_credential = excluded.encrypted_credential,
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![
                record.id.to_string(),
                record.name,
                record.endpoint_url,
                record.encrypted_credential,
                record.active as i64,
                record.status.as_str(),
                record.status_message,
                record.capability_count as i64,
                record.description,
                record.last_tested_at.as_ref().map(Self::format_datetime),
                record.last_connected_at.as_ref().map(Self::format_datetime),
                Self::format_datetime(&record.created_at),
                Self::format_datetime(&record.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(SaveOutcome::Saved),
            Err(e) if Self::is_unique_violation(&e) => {
                debug!(name = %record.name, "Name already taken");
                Ok(SaveOutcome::DuplicateName)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: &Uuid) -> Result<DeleteOutcome> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let deleted = conn.execute(
            "DELETE FROM servers WHERE id = ?1 AND is_active = 0",
            params![id.to_string()],
        )?;
        if deleted > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        // Still under the same lock, so this sees the row the delete skipped
        let exists = conn
            .query_row(
                "SELECT 1 FROM servers WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        Ok(if exists {
            DeleteOutcome::Active
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn activate_exclusive(&self, id: &Uuid) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let now = Self::format_datetime(&Utc::now());

        // Dropping the transaction without commit rolls back
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "UPDATE servers SET is_active = 0, updated_at = ?1 WHERE is_active = 1",
            params![now],
        )?;

        let rows_affected = tx.execute(
            "UPDATE servers SET is_active = 1, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), now],
        )?;

        if rows_affected == 0 {
            return Ok(false);
        }

        tx.commit()?;

        Ok(true)
    }

    async fn deactivate_all(&self) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute(
            "UPDATE servers SET is_active = 0, updated_at = ?1 WHERE is_active = 1",
            params![Self::format_datetime(&Utc::now())],
        )?;

        Ok(())
    }

    async fn update_status(&self, id: &Uuid, update: &StatusUpdate) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute(
            "UPDATE servers
             SET status = ?2, status_message = ?3, capability_count = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                update.status.as_str(),
                update.message,
                update.capability_count as i64,
                Self::format_datetime(&Utc::now()),
            ],
        )?;

        Ok(())
    }

    async fn mark_connected(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute(
            "UPDATE servers SET last_connected_at = ?2 WHERE id = ?1",
            params![id.to_string(), Self::format_datetime(&at)],
        )?;

        Ok(())
    }

    async fn mark_tested(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute(
            "UPDATE servers SET last_tested_at = ?2 WHERE id = ?1",
            params![id.to_string(), Self::format_datetime(&at)],
        )?;

        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM servers", [], |row| row.get(0))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}
