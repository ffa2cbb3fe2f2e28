//! Shared helpers for integration tests.
//!
//! - `fixtures`: provider wire responses and harness builders
//! - `logger`: per-test structured logging
//! - `log_capture`: assertions over the crate's tracing output

pub mod fixtures;
pub mod log_capture;
pub mod logger;
