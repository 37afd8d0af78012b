//! Secret encryption seam
//!
//! Implemented by the credential vault in `mcplink-storage`. The registry
//! only encrypts; the supervisor and the tester decrypt right before a
//! connection is opened.

use std::sync::Arc;

use crate::error::CryptoError;

/// Symmetric encryption of text secrets.
///
/// Empty input maps to empty output in both directions.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// Shared cipher handle
pub type SharedCipher = Arc<dyn SecretCipher>;
