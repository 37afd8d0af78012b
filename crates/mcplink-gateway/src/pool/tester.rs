//! ConnectionTester - one-shot probes that never touch the supervisor
//!
//! A probe runs the same decrypt, connect, discover path as a supervised
//! connection and always closes what it opened.

use std::sync::Arc;

use chrono::Utc;
use mcplink_core::{
    ConnectionError, RegistryError, SecretCipher, ServerRepository, StatusUpdate, TestResult,
};
use tracing::{info, warn};
use uuid::Uuid;

use super::transport::{ConnectTarget, Connector};

/// Server name used in the client identity of candidate probes
const PROBE_SERVER_NAME: &str = "test";

pub struct ConnectionTester {
    repo: Arc<dyn ServerRepository>,
    cipher: Arc<dyn SecretCipher>,
    connector: Arc<dyn Connector>,
}

impl ConnectionTester {
    pub fn new(
        repo: Arc<dyn ServerRepository>,
        cipher: Arc<dyn SecretCipher>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            repo,
            cipher,
            connector,
        }
    }

    /// Probe an unsaved URL and credential.
    ///
    /// The credential goes through the vault first so a probe exercises the
    /// same path as a stored server.
    pub async fn test_candidate(
        &self,
        url: &str,
        credential: &str,
    ) -> Result<TestResult, RegistryError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RegistryError::Validation("Server URL is required".to_string()));
        }

        let encrypted = self.cipher.encrypt(credential.trim())?;

        info!(url = %url, "[Tester] Probing candidate server");
        let result = self
            .probe(None, PROBE_SERVER_NAME, url, &encrypted)
            .await;
        Ok(result)
    }

    /// Probe a stored server.
    ///
    /// Always records `last_tested_at`; writes a connected status only on
    /// success.
    pub async fn test_server(&self, server_id: Uuid) -> Result<TestResult, RegistryError> {
        let record = self
            .repo
            .get(&server_id)
            .await?
            .ok_or(RegistryError::NotFound(server_id))?;

        // Surface a broken credential as an error rather than a failed probe
        self.cipher.decrypt(&record.encrypted_credential)?;

        info!(
            server_id = %record.id,
            name = %record.name,
            "[Tester] Probing stored server"
        );

        let result = self
            .probe(
                Some(record.id),
                &record.name,
                &record.endpoint_url,
                &record.encrypted_credential,
            )
            .await;

        self.repo.mark_tested(&record.id, Utc::now()).await?;
        if result.success {
            let update =
                StatusUpdate::connected(result.message.clone(), result.capability_count as u32);
            self.repo.update_status(&record.id, &update).await?;
        }

        Ok(result)
    }

    async fn probe(
        &self,
        server_id: Option<Uuid>,
        server_name: &str,
        url: &str,
        encrypted_credential: &str,
    ) -> TestResult {
        match self
            .connect_and_list(server_id, server_name, url, encrypted_credential)
            .await
        {
            Ok(result) => {
                info!(
                    url = %url,
                    capabilities = result.capability_count,
                    "[Tester] Probe succeeded"
                );
                result
            }
            Err(e) => {
                warn!(url = %url, kind = ?e.kind, "[Tester] Probe failed: {}", e);
                TestResult::failure(format!("Connection failed: {}", e))
            }
        }
    }

    async fn connect_and_list(
        &self,
        server_id: Option<Uuid>,
        server_name: &str,
        url: &str,
        encrypted_credential: &str,
    ) -> Result<TestResult, ConnectionError> {
        let credential = self.cipher.decrypt(encrypted_credential)?;
        let target = ConnectTarget::new(server_id, server_name, url, credential);

        let connection = self.connector.connect(&target).await?;
        let listed = connection.list_capabilities().await;
        connection.close().await;

        Ok(TestResult::success(listed?))
    }
}
