//! Error types for folio.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized into six main categories:
//! - **Dispatch**: Outcomes the dispatcher surfaces to its caller
//!   (all providers failed, daily cap reached, invalid request)
//! - **Provider**: Failures reported by a single provider adapter
//! - **Configuration**: Config file parsing, validation, or missing values
//! - **Storage**: Quota/cooldown state and attempt log persistence
//! - **Network**: Connection and timeout issues outside an adapter call
//! - **Internal**: Unexpected errors, bugs, or unclassified issues
//!
//! Each error has a stable error code (e.g., `FOLIO-D001`) for programmatic handling.
//!
//! Transient and rate-limited provider failures are resolved inside the
//! dispatcher and never reach the caller as errors; they only show up in the
//! attempt log.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Typed dispatch results surfaced to the caller.
    Dispatch,
    /// Provider-specific issues (rate limits, auth, API errors).
    Provider,
    /// Configuration issues (parse errors, invalid values, missing files).
    Configuration,
    /// Persistence issues (state database, attempt log).
    Storage,
    /// Network issues (timeout, connection refused).
    Network,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch error",
            Self::Provider => "Provider error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Network => "Network error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Dispatch => "D",
            Self::Provider => "P",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Network => "N",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the operator CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Every candidate model failed or was unavailable
    ProvidersExhausted = 2,
    /// Invalid request or configuration
    InvalidInput = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for folio operations.
///
/// Each variant has:
/// - A stable error code (e.g., `FOLIO-D001`)
/// - A category for classification
/// - A retryable flag for callers that want to try again later
#[derive(Error, Debug)]
pub enum FolioError {
    // ==========================================================================
    // Dispatch results (Category: Dispatch)
    // ==========================================================================
    /// Every candidate model was skipped or failed.
    #[error("all providers failed for task '{task}' after {attempts} attempt(s): {last_error}")]
    AllProvidersFailed {
        task: String,
        attempts: usize,
        last_error: String,
    },

    /// The forced model reached its daily cap and fallback was disabled.
    #[error("daily limit exceeded for model {model}")]
    DailyLimitExceeded { model: String },

    /// The request failed validation before any provider was contacted.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // ==========================================================================
    // Provider errors (Category: Provider)
    // ==========================================================================
    /// Rate limited by provider.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider API returned an error.
    #[error("provider {provider} API error: {message}")]
    ProviderApiError {
        provider: String,
        status_code: Option<u16>,
        message: String,
    },

    /// Credentials for the provider are missing.
    #[error("no API key configured for {provider} (set {env_var})")]
    MissingApiKey { provider: String, env_var: String },

    /// Unknown provider name.
    #[error("invalid provider: {0}")]
    InvalidProvider(String),

    /// Unknown model identity.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Failed to parse provider response.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid { key: String, message: String },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// State database failure.
    #[error("storage error: {0}")]
    Storage(String),

    // ==========================================================================
    // Network errors (Category: Network)
    // ==========================================================================
    /// Request timeout.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic network error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for FolioError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl FolioError {
    /// Map error to a CLI exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::AllProvidersFailed { .. } | Self::DailyLimitExceeded { .. } => {
                ExitCode::ProvidersExhausted
            }

            Self::InvalidRequest(_)
            | Self::InvalidProvider(_)
            | Self::UnknownModel(_)
            | Self::MissingApiKey { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_) => ExitCode::InvalidInput,

            Self::Timeout(_) => ExitCode::Timeout,

            Self::RateLimited { .. }
            | Self::ProviderApiError { .. }
            | Self::ParseResponse(_)
            | Self::Storage(_)
            | Self::Network(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AllProvidersFailed { .. }
            | Self::DailyLimitExceeded { .. }
            | Self::InvalidRequest(_) => ErrorCategory::Dispatch,

            Self::RateLimited { .. }
            | Self::ProviderApiError { .. }
            | Self::MissingApiKey { .. }
            | Self::InvalidProvider(_)
            | Self::UnknownModel(_)
            | Self::ParseResponse(_) => ErrorCategory::Provider,

            Self::ConfigParse { .. } | Self::ConfigInvalid { .. } | Self::Config(_) => {
                ErrorCategory::Configuration
            }

            Self::Storage(_) => ErrorCategory::Storage,

            Self::Timeout(_) | Self::Network(_) => ErrorCategory::Network,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Stable error code for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::AllProvidersFailed { .. } => "FOLIO-D001",
            Self::DailyLimitExceeded { .. } => "FOLIO-D002",
            Self::InvalidRequest(_) => "FOLIO-D003",

            Self::RateLimited { .. } => "FOLIO-P001",
            Self::ProviderApiError { .. } => "FOLIO-P002",
            Self::MissingApiKey { .. } => "FOLIO-P003",
            Self::InvalidProvider(_) => "FOLIO-P004",
            Self::UnknownModel(_) => "FOLIO-P005",
            Self::ParseResponse(_) => "FOLIO-P006",

            Self::ConfigParse { .. } => "FOLIO-C001",
            Self::ConfigInvalid { .. } => "FOLIO-C002",
            Self::Config(_) => "FOLIO-C003",

            Self::Storage(_) => "FOLIO-S001",

            Self::Timeout(_) => "FOLIO-N001",
            Self::Network(_) => "FOLIO-N002",

            Self::Io(_) => "FOLIO-X001",
            Self::Json(_) => "FOLIO-X002",
            Self::Other(_) => "FOLIO-X003",
        }
    }

    /// Whether trying the same operation again later can reasonably succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllProvidersFailed { .. }
                | Self::RateLimited { .. }
                | Self::Timeout(_)
                | Self::Network(_)
        )
    }

    /// Suggested wait before retrying, when the provider told us.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for folio operations.
pub type Result<T> = std::result::Result<T, FolioError>;
