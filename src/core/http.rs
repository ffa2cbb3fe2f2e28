//! HTTP client utilities.
//!
//! Provides the shared HTTP client for provider adapters and the per-call
//! timeout policy.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{FolioError, Result};

/// Floor for generation call timeouts.
pub const MIN_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Ceiling for generation call timeouts.
pub const MAX_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Requested output tokens budgeted per second of timeout.
const TOKENS_PER_SECOND: u64 = 20;

/// Timeout for connection establishment.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// User agent sent with every request.
#[must_use]
pub fn user_agent() -> String {
    format!("folio/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a configured HTTP client.
///
/// Request timeouts are set per call with [`timeout_for`]; `timeout` here is
/// the client-wide default for calls that set none.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(user_agent())
        .build()
        .map_err(|e| FolioError::Network(e.to_string()))
}

/// Build the default client used by all adapters.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn default_client() -> Result<Client> {
    build_client(MAX_GENERATION_TIMEOUT)
}

/// Timeout for a generation call asking for up to `max_tokens` tokens.
///
/// About one second per 20 tokens, never below 30s or above 300s.
#[must_use]
pub fn timeout_for(max_tokens: u32) -> Duration {
    let scaled = Duration::from_secs(u64::from(max_tokens).div_ceil(TOKENS_PER_SECOND));
    scaled.clamp(MIN_GENERATION_TIMEOUT, MAX_GENERATION_TIMEOUT)
}
