//! Per-model rate-limit accounting.
//!
//! Each model has a rolling per-minute window and a per-UTC-day counter.
//! Reservations are recorded as timestamps so that no more than the
//! per-minute limit ever succeed inside any window-length span, not just
//! inside fixed buckets.
//!
//! The day counter counts every reservation attempt, denied ones included,
//! and stops at the per-day limit.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use super::clock::{Clock, elapsed_between, offset_saturating};
use super::registry::ModelSpec;
use crate::error::Result;
use crate::storage::state_store::{QuotaState, QuotaStore};

/// Default rolling-window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Result of a quota reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A slot was taken; the call may proceed.
    Allowed,
    /// The window is full; a slot frees up after `wait`.
    Denied { wait: Duration },
    /// The per-day limit is spent until the next UTC day.
    DailyLimitExceeded,
}

/// Read-only view of a model's quota for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaStatus {
    pub model: String,
    pub used_in_window: u32,
    pub per_minute_limit: u32,
    pub used_today: u32,
    pub per_day_limit: u32,
    /// When the oldest in-window reservation expires.
    pub window_resets_at: Option<DateTime<Utc>>,
}

/// Tracks and enforces per-model rate limits.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl QuotaTracker {
    #[must_use]
    pub fn new(store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            window: DEFAULT_WINDOW,
        }
    }

    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Try to take one call slot for `model`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the state cannot be read or written.
    pub fn reserve(&self, model: &ModelSpec) -> Result<Reservation> {
        let now = self.clock.now();
        let window = self.window;
        let mut decision = Reservation::DailyLimitExceeded;

        self.store.modify_quota(&model.id, &mut |state| {
            decision = apply_reservation(state, model, now, window);
        })?;

        debug!(
            model = %model.id,
            decision = ?decision,
            "Quota reservation"
        );
        Ok(decision)
    }

    /// Current usage for `model` without reserving.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the state cannot be read.
    pub fn status(&self, model: &ModelSpec) -> Result<QuotaStatus> {
        let now = self.clock.now();
        let mut state = self.store.quota(&model.id)?;
        roll_day(&mut state, now.date_naive());
        prune_window(&mut state, now, self.window);

        Ok(QuotaStatus {
            model: model.id.clone(),
            used_in_window: state.count_in_window(),
            per_minute_limit: model.per_minute_limit,
            used_today: state.day_count,
            per_day_limit: model.per_day_limit,
            window_resets_at: state
                .window_start()
                .map(|start| offset_saturating(start, self.window)),
        })
    }
}

fn roll_day(state: &mut QuotaState, today: NaiveDate) {
    if state.day_anchor != Some(today) {
        state.day_anchor = Some(today);
        state.day_count = 0;
    }
}

fn prune_window(state: &mut QuotaState, now: DateTime<Utc>, window: Duration) {
    state
        .recent
        .retain(|at| elapsed_between(*at, now) < window && *at <= now);
}

fn apply_reservation(
    state: &mut QuotaState,
    model: &ModelSpec,
    now: DateTime<Utc>,
    window: Duration,
) -> Reservation {
    roll_day(state, now.date_naive());
    if state.day_count >= model.per_day_limit {
        return Reservation::DailyLimitExceeded;
    }
    state.day_count += 1;

    prune_window(state, now, window);
    if state.count_in_window() < model.per_minute_limit {
        state.recent.push(now);
        return Reservation::Allowed;
    }

    let oldest = state.window_start().unwrap_or(now);
    let wait = window.saturating_sub(elapsed_between(oldest, now));
    Reservation::Denied { wait }
}
