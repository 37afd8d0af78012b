//! Repository traits for data access
//!
//! These traits define the interface for data storage without specifying
//! the implementation (SQLite, in-memory, etc.)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ServerRecord, StatusUpdate};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Outcome of `ServerRepository::insert_or_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another record already uses the name; nothing was written
    DuplicateName,
}

/// Outcome of `ServerRepository::delete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The record is active and was left in place
    Active,
    NotFound,
}

/// ServerRecord repository trait
#[async_trait]
pub trait ServerRepository: Send + Sync {
    /// Get all servers, newest first
    async fn list(&self) -> RepoResult<Vec<ServerRecord>>;

    /// Get a server by ID
    async fn get(&self, id: &Uuid) -> RepoResult<Option<ServerRecord>>;

    /// Get a server by its exact name
    async fn get_by_name(&self, name: &str) -> RepoResult<Option<ServerRecord>>;

    /// Get the active server, if any
    async fn get_active(&self) -> RepoResult<Option<ServerRecord>>;

    /// Insert a new record or replace an existing one with the same ID.
    ///
    /// A name clash is reported as `SaveOutcome::DuplicateName`, not as an error.
    async fn insert_or_update(&self, record: &ServerRecord) -> RepoResult<SaveOutcome>;

    /// Delete a server unless it is active, checked in the same step
    async fn delete(&self, id: &Uuid) -> RepoResult<DeleteOutcome>;

    /// Deactivate every record, then activate `id`, in one transaction.
    ///
    /// Returns `false` (and rolls back) when `id` does not exist.
    async fn activate_exclusive(&self, id: &Uuid) -> RepoResult<bool>;

    /// Deactivate every record
    async fn deactivate_all(&self) -> RepoResult<()>;

    /// Write status, message and capability count
    async fn update_status(&self, id: &Uuid, update: &StatusUpdate) -> RepoResult<()>;

    /// Record a successful supervised connection
    async fn mark_connected(&self, id: &Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    /// Record a probe by the connection tester
    async fn mark_tested(&self, id: &Uuid, at: DateTime<Utc>) -> RepoResult<()>;

    /// Number of stored records
    async fn count(&self) -> RepoResult<usize>;
}
