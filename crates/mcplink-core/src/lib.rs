//! # McpLink Core Library
//!
//! Domain types, repository traits and the server registry.
//!
//! ## Modules
//!
//! - `domain` - Server records, runtime connection status, capabilities, events
//! - `repository` - Data access traits
//! - `application` - Server registry with event emission
//! - `cipher` - Secret encryption seam implemented by the credential vault
//! - `error` - Error taxonomy shared by all crates
//! - `event_bus` - Central event distribution

pub mod application;
pub mod cipher;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod repository;

pub use domain::*;
pub use repository::*;

pub use application::{NewServer, ServerRegistry, ServerUpdate};
pub use cipher::{SecretCipher, SharedCipher};
pub use error::{ConnectionError, ConnectionErrorKind, CryptoError, RegistryError, SupervisorError};
pub use event_bus::{EventBus, EventReceiver, EventSender, SharedEventBus};
