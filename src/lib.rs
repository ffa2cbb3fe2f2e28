//! folio - multi-provider text generation dispatcher
//!
//! Routes generation requests across rate-limited LLM providers (Gemini,
//! Groq, `OpenRouter`, Ollama) with quota tracking, cooldowns and retries,
//! and drives chapter-length content through a plagiarism-check and rewrite
//! loop until it is accepted.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, FolioError, Result};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
