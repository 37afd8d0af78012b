//! Gateway integration tests
//!
//! Supervisor state machine, capability cache, tester, and the Streamable
//! HTTP transport against an in-process tool server.

mod capability_cache;
mod http_transport;
