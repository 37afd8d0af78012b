//! Domain entities, value objects, and events
//!
//! - Entities (ServerRecord)
//! - Value Objects (ServerStatus, ConnectionStatus, CapabilityDescriptor)
//! - Domain Events (DomainEvent enum)

mod capability;
mod connection;
mod event;
mod server_record;

pub use capability::{CapabilityDescriptor, TestResult};
pub use connection::{ConnectionState, ConnectionStatus};
pub use event::DomainEvent;
pub use server_record::{ServerRecord, ServerStatus, ServerView, StatusUpdate};
