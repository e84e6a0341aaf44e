//! Sentinel agent: HTTP API, configuration and scheduled detection
//!
//! The binary in `main.rs` wires these together; they live in a library so
//! the router can be exercised from integration tests.

pub mod api;
pub mod config;
pub mod scheduler;
