//! Attempt recording.
//!
//! The dispatcher hands every [`Attempt`] to an [`AttemptRecorder`]. A
//! recorder failure is logged and never changes the dispatch result.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use crate::core::models::{Attempt, OutcomeKind};
use crate::error::Result;

/// Sink for attempt records.
pub trait AttemptRecorder: Send + Sync + Debug {
    /// Persist one attempt.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the record cannot be written.
    fn record(&self, attempt: &Attempt) -> Result<()>;
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAttemptLog;

impl AttemptRecorder for NullAttemptLog {
    fn record(&self, _attempt: &Attempt) -> Result<()> {
        Ok(())
    }
}

/// In-memory recorder, mostly for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryAttemptLog {
    attempts: Mutex<Vec<Attempt>>,
}

impl MemoryAttemptLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded attempts in order.
    #[must_use]
    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded attempts with the given outcome.
    #[must_use]
    pub fn count(&self, outcome: OutcomeKind) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.outcome == outcome)
            .count()
    }
}

impl AttemptRecorder for MemoryAttemptLog {
    fn record(&self, attempt: &Attempt) -> Result<()> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attempt.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::TaskType;
    use crate::core::registry::Provider;
    use chrono::Utc;

    fn attempt(outcome: OutcomeKind) -> Attempt {
        Attempt {
            request_id: "r1".to_string(),
            task: TaskType::Fast,
            prompt_sha256: "abc".to_string(),
            model: "groq/llama-3.1-8b-instant".to_string(),
            provider: Provider::Groq,
            outcome,
            raw_response: None,
            normalized: None,
            error: None,
            started_at: Utc::now(),
            duration_ms: 5,
            retry_index: 0,
        }
    }

    #[test]
    fn memory_log_keeps_order_and_counts() {
        let log = MemoryAttemptLog::new();
        log.record(&attempt(OutcomeKind::RateLimited)).unwrap();
        log.record(&attempt(OutcomeKind::Success)).unwrap();

        let attempts = log.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].outcome, OutcomeKind::RateLimited);
        assert_eq!(log.count(OutcomeKind::Success), 1);
    }

    #[test]
    fn null_log_accepts_everything() {
        assert!(NullAttemptLog.record(&attempt(OutcomeKind::FatalError)).is_ok());
    }
}
