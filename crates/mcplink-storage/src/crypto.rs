//! Credential vault.
//!
//! AES-256-GCM authenticated encryption of server credentials before they
//! are stored. Blobs are `base64(nonce || ciphertext || tag)`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use mcplink_core::{CryptoError, SecretCipher};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Size of the encryption key (32 bytes = 256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the nonce (12 bytes for AES-GCM).
const NONCE_SIZE: usize = 12;

/// Where the vault's master key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Supplied through configuration
    Configured,
    /// Generated for this process only; lost on restart
    Ephemeral,
}

/// Encrypts and decrypts credentials with a single master key.
pub struct CredentialVault {
    key: LessSafeKey,
    rng: SystemRandom,
    source: KeySource,
}

impl CredentialVault {
    /// Create a vault with the given master key.
    pub fn new(master_key: &[u8; KEY_SIZE]) -> Result<Self, CryptoError> {
        Self::with_source(master_key, KeySource::Configured)
    }

    fn with_source(master_key: &[u8; KEY_SIZE], source: KeySource) -> Result<Self, CryptoError> {
        let unbound_key = UnboundKey::new(&AES_256_GCM, master_key)
            .map_err(|_| CryptoError::InvalidKey("rejected by cipher".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound_key),
            rng: SystemRandom::new(),
            source,
        })
    }

    /// Build a vault from an optional base64-encoded key.
    ///
    /// A missing or blank key generates a process-lifetime key and logs a
    /// warning: anything encrypted with it is unreadable after a restart.
    /// A malformed key is an error, never a silent fallback.
    pub fn from_base64_key(encoded: Option<&str>) -> Result<Self, CryptoError> {
        match encoded.map(str::trim).filter(|k| !k.is_empty()) {
            Some(encoded) => {
                let bytes = Zeroizing::new(
                    BASE64
                        .decode(encoded)
                        .map_err(|_| CryptoError::InvalidKey("must be base64 encoded".to_string()))?,
                );
                let key: Zeroizing<[u8; KEY_SIZE]> =
                    Zeroizing::new(bytes.as_slice().try_into().map_err(|_| {
                        CryptoError::InvalidKey(format!(
                            "expected {} bytes, got {}",
                            KEY_SIZE,
                            bytes.len()
                        ))
                    })?);
                info!("[Vault] Credential vault initialized with configured key");
                Self::new(&key)
            }
            None => {
                warn!(
                    "[Vault] No encryption key configured, using a temporary key: stored \
                     credentials become unreadable after restart. Set \
                     MCPLINK_ENCRYPTION_KEY (see mcplink-keygen) for production"
                );
                let key = generate_master_key()?;
                Self::with_source(&key, KeySource::Ephemeral)
            }
        }
    }

    /// Where the master key came from
    pub fn key_source(&self) -> KeySource {
        self.source
    }

    /// Encrypt a plaintext string. Empty input yields an empty blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::Rng)?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Authentication)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);

        Ok(BASE64.encode(blob))
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// An empty blob yields an empty string.
    pub fn decrypt(&self, blob: &str) -> Result<String, CryptoError> {
        if blob.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64.decode(blob).map_err(|_| CryptoError::Encoding)?;
        if data.len() < NONCE_SIZE + AES_256_GCM.tag_len() {
            return Err(CryptoError::Truncated);
        }

        let (nonce_bytes, encrypted) = data.split_at(NONCE_SIZE);
        let nonce_array: [u8; NONCE_SIZE] =
            nonce_bytes.try_into().map_err(|_| CryptoError::Truncated)?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let mut in_out = Zeroizing::new(encrypted.to_vec());
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl SecretCipher for CredentialVault {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        CredentialVault::encrypt(self, plaintext)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        CredentialVault::decrypt(self, ciphertext)
    }
}

/// Generate a random master key.
pub fn generate_master_key() -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let rng = SystemRandom::new();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rng.fill(key.as_mut()).map_err(|_| CryptoError::Rng)?;
    Ok(key)
}

/// Generate a random master key, base64 encoded for configuration.
pub fn generate_master_key_base64() -> Result<String, CryptoError> {
    let key = generate_master_key()?;
    Ok(BASE64.encode(key.as_ref()))
}
