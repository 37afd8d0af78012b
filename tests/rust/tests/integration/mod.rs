//! End-to-end scenarios
//!
//! Registry, supervisor and cache wired together the way the daemon wires
//! them, with activation changes flowing through the event bus.

mod active_swap;
