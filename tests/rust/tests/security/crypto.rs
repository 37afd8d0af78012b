//! Crypto integration tests
//!
//! Unit tests already exist in mcplink_storage::crypto::tests

use mcplink_core::{CryptoError, NewServer, ServerRegistry, ServerRepository};
use mcplink_storage::{
    generate_master_key, generate_master_key_base64, CredentialVault, KeySource, KEY_SIZE,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tests::{db, fixtures, MockServerRepository};

#[test]
fn test_generate_master_key() {
    let key1 = generate_master_key().expect("Failed to generate key");
    let key2 = generate_master_key().expect("Failed to generate key");

    assert_ne!(*key1, *key2);
    assert_eq!(key1.len(), KEY_SIZE);
}

#[test]
fn test_configured_key_round_trip_across_vaults() {
    let encoded = generate_master_key_base64().expect("Failed to generate key");

    let writer = CredentialVault::from_base64_key(Some(&encoded)).unwrap();
    let reader = CredentialVault::from_base64_key(Some(&encoded)).unwrap();
    assert_eq!(writer.key_source(), KeySource::Configured);

    let blob = writer.encrypt("secret1").unwrap();
    assert_eq!(reader.decrypt(&blob).unwrap(), "secret1");
}

#[test]
fn test_ephemeral_keys_do_not_decrypt_each_other() {
    let first = CredentialVault::from_base64_key(None).unwrap();
    let second = CredentialVault::from_base64_key(Some("  ")).unwrap();
    assert_eq!(first.key_source(), KeySource::Ephemeral);
    assert_eq!(second.key_source(), KeySource::Ephemeral);

    let blob = first.encrypt("secret1").unwrap();
    assert_eq!(second.decrypt(&blob), Err(CryptoError::Authentication));
}

#[test]
fn test_ciphertext_layout() {
    let vault = fixtures::test_vault();
    let blob = vault.encrypt("secret1").unwrap();

    // 12-byte nonce, 7-byte payload, 16-byte tag, base64 encoded
    assert_eq!(blob.len(), (12 + 7 + 16usize).div_ceil(3) * 4);
    assert!(!blob.contains("secret1"));
}

#[tokio::test]
async fn test_registry_stores_only_ciphertext() {
    let repo = db::in_memory_repository();
    let vault = fixtures::test_vault();
    let bus = mcplink_core::EventBus::new();
    let registry = ServerRegistry::new(repo.clone(), vault.clone(), bus.sender());

    let record = registry
        .create(NewServer::new("alpha", "http://alpha:8081", "secret1"))
        .await
        .unwrap();

    let stored = repo.get(&record.id).await.unwrap().unwrap();
    assert!(!stored.encrypted_credential.is_empty());
    assert_ne!(stored.encrypted_credential, "secret1");
    assert_eq!(vault.decrypt(&stored.encrypted_credential).unwrap(), "secret1");

    // Serialized records never carry the ciphertext
    let json = serde_json::to_string(&stored).unwrap();
    assert!(!json.contains(&stored.encrypted_credential));
}

#[tokio::test]
async fn test_blank_credential_stored_empty() {
    let repo = Arc::new(MockServerRepository::new());
    let bus = mcplink_core::EventBus::new();
    let registry = ServerRegistry::new(repo.clone(), fixtures::test_vault(), bus.sender());

    let record = registry
        .create(NewServer::new("alpha", "http://alpha:8081", "   "))
        .await
        .unwrap();

    assert_eq!(repo.snapshot(&record.id).unwrap().encrypted_credential, "");
    assert!(!record.has_credential());
}

/// Captures formatted log output in memory
#[derive(Clone, Default)]
struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_ephemeral_key_warns_once() {
    use tracing_subscriber::util::SubscriberInitExt;

    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing_subscriber::filter::LevelFilter::WARN)
        .finish();

    let vault = {
        let _guard = subscriber.set_default();
        CredentialVault::from_base64_key(None).unwrap()
    };
    assert_eq!(vault.key_source(), KeySource::Ephemeral);

    let output = logs.text();
    assert_eq!(output.matches("WARN").count(), 1, "{}", output);
    assert!(output.contains("MCPLINK_ENCRYPTION_KEY"));
}
