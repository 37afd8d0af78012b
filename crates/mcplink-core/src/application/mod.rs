//! Application Services - Orchestration layer with event emission
//!
//! Application services sit between the administrative caller (daemon,
//! management API) and the repositories. They validate inputs, enforce
//! business rules and emit events after successful operations.
//!
//! ```ignore
//! let event_bus = EventBus::new();
//! let registry = ServerRegistry::new(repo, vault, event_bus.sender());
//!
//! let record = registry.create(NewServer::new("alpha", "http://x", "secret1")).await?;
//! registry.activate(record.id).await?;
//! // -> Emits ServerCreated, then ActiveServerChanged
//! ```

mod registry;

pub use registry::{NewServer, ServerRegistry, ServerUpdate};
