//! Temporary model exclusion after a rate-limit signal.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::clock::{Clock, elapsed_between, offset_saturating};
use crate::error::Result;
use crate::storage::state_store::{CooldownState, CooldownStore};

/// Default cooldown after a rate-limit response.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Upper bound on any cooldown, whatever the provider asks for.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CooldownTracker {
    store: Arc<dyn CooldownStore>,
    clock: Arc<dyn Clock>,
    duration: Duration,
}

impl CooldownTracker {
    #[must_use]
    pub fn new(store: Arc<dyn CooldownStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            duration: DEFAULT_COOLDOWN,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Default cooldown length.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Start (or restart) the cooldown for `model`.
    ///
    /// A `retry_after` longer than the default duration extends the cooldown,
    /// up to [`MAX_COOLDOWN`].
    ///
    /// # Errors
    ///
    /// Returns a storage error if the state cannot be written.
    pub fn record_rate_limit(&self, model: &str, retry_after: Option<Duration>) -> Result<()> {
        let now = self.clock.now();
        let length = retry_after
            .map_or(self.duration, |hint| hint.max(self.duration))
            .min(MAX_COOLDOWN.max(self.duration));

        info!(
            model = %model,
            cooldown_secs = length.as_secs(),
            "Model rate limited, cooling down"
        );

        self.store.set_cooldown(
            model,
            &CooldownState {
                last_rate_limit: Some(now),
                until: Some(offset_saturating(now, length)),
            },
        )
    }

    /// Time left before `model` may be selected again.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the state cannot be read.
    pub fn remaining(&self, model: &str) -> Result<Duration> {
        let state = self.store.cooldown(model)?;
        let now = self.clock.now();

        let until = match (state.until, state.last_rate_limit) {
            (Some(until), _) => until,
            (None, Some(last)) => offset_saturating(last, self.duration),
            (None, None) => return Ok(Duration::ZERO),
        };
        Ok(elapsed_between(now, until))
    }

    /// Whether `model` is still cooling down.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the state cannot be read.
    pub fn is_cooling(&self, model: &str) -> Result<bool> {
        Ok(!self.remaining(model)?.is_zero())
    }
}
