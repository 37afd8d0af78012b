//! Server Registry
//!
//! CRUD over server records with validation, credential encryption and
//! event emission. Owns the single-active invariant through the
//! repository's transactional `activate_exclusive`.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cipher::SecretCipher;
use crate::domain::{DomainEvent, ServerRecord};
use crate::error::RegistryError;
use crate::event_bus::EventSender;
use crate::repository::{DeleteOutcome, SaveOutcome, ServerRepository};

/// Input for [`ServerRegistry::create`]
#[derive(Debug, Clone, Default)]
pub struct NewServer {
    pub name: String,
    pub url: String,
    /// Plaintext credential; blank means none
    pub credential: String,
    pub description: Option<String>,
}

impl NewServer {
    pub fn new(name: impl Into<String>, url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            credential: credential.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Input for [`ServerRegistry::update`]
#[derive(Debug, Clone, Default)]
pub struct ServerUpdate {
    pub name: String,
    pub url: String,
    /// New plaintext credential; `None` or blank keeps the stored ciphertext
    pub credential: Option<String>,
    pub description: Option<String>,
}

impl ServerUpdate {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            credential: None,
            description: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Application service for server records
pub struct ServerRegistry {
    repo: Arc<dyn ServerRepository>,
    cipher: Arc<dyn SecretCipher>,
    event_sender: EventSender,
}

impl ServerRegistry {
    pub fn new(
        repo: Arc<dyn ServerRepository>,
        cipher: Arc<dyn SecretCipher>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            repo,
            cipher,
            event_sender,
        }
    }

    /// Create a new, inactive server record
    ///
    /// Emits: `ServerCreated`
    pub async fn create(&self, input: NewServer) -> Result<ServerRecord, RegistryError> {
        let name = validate_name(&input.name)?;
        let url = validate_url(&input.url)?;

        if self.repo.get_by_name(&name).await?.is_some() {
            return Err(duplicate_name(&name));
        }

        let encrypted = self.encrypt_if_present(&input.credential)?;
        let record = ServerRecord::new(name, url, encrypted)
            .with_description(normalize_description(input.description));

        // A concurrent writer can take the name after the lookup above
        if self.repo.insert_or_update(&record).await? == SaveOutcome::DuplicateName {
            return Err(duplicate_name(&record.name));
        }

        info!(
            server_id = %record.id,
            name = %record.name,
            "[ServerRegistry] Created server"
        );

        self.event_sender.emit(DomainEvent::ServerCreated {
            server_id: record.id,
            name: record.name.clone(),
        });

        Ok(record)
    }

    /// Update name, url, description and optionally the credential
    ///
    /// Emits: `ServerUpdated`
    pub async fn update(&self, id: Uuid, input: ServerUpdate) -> Result<ServerRecord, RegistryError> {
        let mut record = self
            .repo
            .get(&id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;

        let name = validate_name(&input.name)?;
        let url = validate_url(&input.url)?;

        if name != record.name {
            if let Some(other) = self.repo.get_by_name(&name).await? {
                if other.id != id {
                    return Err(duplicate_name(&name));
                }
            }
        }

        let credential_changed = match input.credential.as_deref() {
            Some(plaintext) if !plaintext.trim().is_empty() => {
                record.encrypted_credential = self.cipher.encrypt(plaintext)?;
                true
            }
            _ => false,
        };

        record.name = name;
        record.endpoint_url = url;
        record.description = normalize_description(input.description);
        record.updated_at = chrono::Utc::now();

        // A concurrent writer can take the name after the lookup above
        if self.repo.insert_or_update(&record).await? == SaveOutcome::DuplicateName {
            return Err(duplicate_name(&record.name));
        }

        info!(
            server_id = %id,
            credential_changed,
            "[ServerRegistry] Updated server"
        );

        self.event_sender.emit(DomainEvent::ServerUpdated {
            server_id: id,
            name: record.name.clone(),
        });

        Ok(record)
    }

    /// Delete a server. Fails with `Conflict` while the server is active.
    ///
    /// Emits: `ServerDeleted`
    pub async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        let record = self
            .repo
            .get(&id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;

        if record.active {
            return Err(active_delete_conflict());
        }

        // The repository re-checks `active` atomically with the delete
        match self.repo.delete(&id).await? {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::Active => return Err(active_delete_conflict()),
            DeleteOutcome::NotFound => return Err(RegistryError::NotFound(id)),
        }

        info!(server_id = %id, name = %record.name, "[ServerRegistry] Deleted server");

        self.event_sender
            .emit(DomainEvent::ServerDeleted { server_id: id });

        Ok(())
    }

    /// All servers, newest first
    pub async fn find_all(&self) -> Result<Vec<ServerRecord>, RegistryError> {
        Ok(self.repo.list().await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ServerRecord>, RegistryError> {
        Ok(self.repo.get(&id).await?)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<ServerRecord>, RegistryError> {
        Ok(self.repo.get_by_name(name).await?)
    }

    pub async fn find_active(&self) -> Result<Option<ServerRecord>, RegistryError> {
        Ok(self.repo.get_active().await?)
    }

    pub async fn count(&self) -> Result<usize, RegistryError> {
        Ok(self.repo.count().await?)
    }

    /// Make `id` the single active server
    ///
    /// Emits: `ActiveServerChanged`
    pub async fn activate(&self, id: Uuid) -> Result<ServerRecord, RegistryError> {
        if !self.repo.activate_exclusive(&id).await? {
            return Err(RegistryError::NotFound(id));
        }

        let record = self
            .repo
            .get(&id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;

        info!(server_id = %id, name = %record.name, "[ServerRegistry] Activated server");

        self.event_sender.emit(DomainEvent::ActiveServerChanged {
            server_id: Some(id),
        });

        Ok(record)
    }

    /// Clear the active designation on every server
    ///
    /// Emits: `ActiveServerChanged { server_id: None }`
    pub async fn deactivate_all(&self) -> Result<(), RegistryError> {
        self.repo.deactivate_all().await?;

        info!("[ServerRegistry] Deactivated all servers");

        self.event_sender
            .emit(DomainEvent::ActiveServerChanged { server_id: None });

        Ok(())
    }

    fn encrypt_if_present(&self, plaintext: &str) -> Result<String, RegistryError> {
        if plaintext.trim().is_empty() {
            debug!("[ServerRegistry] No credential supplied");
            return Ok(String::new());
        }
        Ok(self.cipher.encrypt(plaintext)?)
    }
}

fn validate_name(name: &str) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::Validation("Name is required".to_string()));
    }
    Ok(name.to_string())
}

fn validate_url(raw: &str) -> Result<String, RegistryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(RegistryError::Validation("URL is required".to_string()));
    }
    let parsed = url::Url::parse(raw)
        .map_err(|e| RegistryError::Validation(format!("Invalid URL '{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RegistryError::Validation(format!(
            "Unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(raw.to_string())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn duplicate_name(name: &str) -> RegistryError {
    RegistryError::Validation(format!("Server with name '{}' already exists", name))
}

fn active_delete_conflict() -> RegistryError {
    RegistryError::Conflict("Cannot delete active server. Please deactivate it first.".to_string())
}
