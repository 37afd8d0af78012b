//! Error types shared across McpLink crates

use thiserror::Error;
use uuid::Uuid;

/// Errors from the credential vault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Master key is not valid base64 or not 32 bytes
    #[error("invalid master key: {0}")]
    InvalidKey(String),

    /// Stored blob is not valid base64
    #[error("invalid credential encoding")]
    Encoding,

    /// Stored blob is shorter than nonce + tag
    #[error("encrypted credential is truncated")]
    Truncated,

    /// Authentication tag mismatch (tampered blob or wrong key)
    #[error("credential authentication failed")]
    Authentication,

    /// Decrypted bytes are not UTF-8
    #[error("decrypted credential is not valid UTF-8")]
    InvalidUtf8,

    /// System RNG failed
    #[error("random number generator failure")]
    Rng,
}

/// Coarse classification of a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionErrorKind {
    Refused,
    Timeout,
    Reset,
    Unreachable,
    ChannelClosed,
    Io,
    Handshake,
    InvalidUrl,
    InvalidCredential,
    Protocol,
    Crypto,
}

impl ConnectionErrorKind {
    /// Transient network conditions are retried, everything else is terminal
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Refused
                | Self::Timeout
                | Self::Reset
                | Self::Unreachable
                | Self::ChannelClosed
                | Self::Io
                | Self::Handshake
        )
    }
}

/// Substrings that mark a transient failure when only a message is available
const RETRYABLE_INDICATORS: &[(&str, ConnectionErrorKind)] = &[
    ("connection refused", ConnectionErrorKind::Refused),
    ("connectexception", ConnectionErrorKind::Refused),
    ("connect exception", ConnectionErrorKind::Refused),
    ("timed out", ConnectionErrorKind::Timeout),
    ("timeout", ConnectionErrorKind::Timeout),
    ("connection reset", ConnectionErrorKind::Reset),
    ("closed channel", ConnectionErrorKind::ChannelClosed),
    ("channel closed", ConnectionErrorKind::ChannelClosed),
    ("no route to host", ConnectionErrorKind::Unreachable),
    ("network unreachable", ConnectionErrorKind::Unreachable),
    ("network is unreachable", ConnectionErrorKind::Unreachable),
    ("failed to initialize", ConnectionErrorKind::Handshake),
];

/// A failed attempt to open, handshake with, or query a remote server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify an error from its message alone.
    ///
    /// Matching is case-insensitive; anything unrecognised is a protocol error.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = Self::classify_message(&message).unwrap_or(ConnectionErrorKind::Protocol);
        Self { kind, message }
    }

    /// Kind implied by the message, if any indicator matches
    pub fn classify_message(message: &str) -> Option<ConnectionErrorKind> {
        let lower = message.to_lowercase();
        RETRYABLE_INDICATORS
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, kind)| *kind)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::Timeout, message)
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(ConnectionErrorKind::InvalidUrl, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<CryptoError> for ConnectionError {
    fn from(err: CryptoError) -> Self {
        Self::new(
            ConnectionErrorKind::Crypto,
            format!("Failed to decrypt credential: {}", err),
        )
    }
}

/// Errors returned by the server registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Input rejected (blank name, bad url, duplicate name)
    #[error("{0}")]
    Validation(String),

    /// Operation not allowed in the current state
    #[error("{0}")]
    Conflict(String),

    #[error("server not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Errors returned by the connection supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no active server configured")]
    NoActiveServer,

    #[error("server is not tracked by the supervisor: {0}")]
    NotTracked(Uuid),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
