//! Per-model quota and cooldown state.
//!
//! The trackers in `core` own the algorithms; stores only keep the records
//! and guarantee that a read-modify-write of one model's quota is atomic.
//! Two implementations ship: [`MemoryStateStore`] for a single process and
//! [`SqliteStateStore`](super::sqlite::SqliteStateStore) for durable state
//! shared across processes.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Rolling-window and daily counters for one model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Reservations still inside the rolling window, oldest first.
    pub recent: Vec<DateTime<Utc>>,
    /// Reservations granted on `day_anchor`.
    pub day_count: u32,
    /// UTC calendar date the day count belongs to.
    pub day_anchor: Option<NaiveDate>,
}

impl QuotaState {
    /// Start of the current window (the oldest in-window reservation).
    #[must_use]
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.recent.first().copied()
    }

    /// Reservations counted against the current window.
    #[must_use]
    pub fn count_in_window(&self) -> u32 {
        u32::try_from(self.recent.len()).unwrap_or(u32::MAX)
    }
}

/// Last rate-limit signal for one model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub last_rate_limit: Option<DateTime<Utc>>,
    /// End of the cooldown; later than `last + default duration` when the
    /// provider asked for a longer wait.
    pub until: Option<DateTime<Utc>>,
}

/// Storage for [`QuotaState`] records.
pub trait QuotaStore: Send + Sync + Debug {
    /// Snapshot of a model's quota state (default when never reserved).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    fn quota(&self, model: &str) -> Result<QuotaState>;

    /// Atomically read, update and write back a model's quota state.
    ///
    /// No other `modify_quota` for the same model interleaves with `update`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read or written.
    fn modify_quota(&self, model: &str, update: &mut dyn FnMut(&mut QuotaState)) -> Result<()>;
}

/// Storage for [`CooldownState`] records.
pub trait CooldownStore: Send + Sync + Debug {
    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be read.
    fn cooldown(&self, model: &str) -> Result<CooldownState>;

    /// # Errors
    ///
    /// Returns a storage error if the backend cannot be written.
    fn set_cooldown(&self, model: &str, state: &CooldownState) -> Result<()>;
}

/// A store holding both kinds of per-model state.
pub trait StateStore: QuotaStore + CooldownStore {}

impl<T: QuotaStore + CooldownStore> StateStore for T {}

#[derive(Debug, Default)]
struct ModelRecord {
    quota: QuotaState,
    cooldown: CooldownState,
}

/// Process-local store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, ModelRecord>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<R>(&self, f: impl FnOnce(&mut HashMap<String, ModelRecord>) -> R) -> R {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut records)
    }
}

impl QuotaStore for MemoryStateStore {
    fn quota(&self, model: &str) -> Result<QuotaState> {
        Ok(self.with_records(|records| {
            records
                .get(model)
                .map(|r| r.quota.clone())
                .unwrap_or_default()
        }))
    }

    fn modify_quota(&self, model: &str, update: &mut dyn FnMut(&mut QuotaState)) -> Result<()> {
        self.with_records(|records| {
            update(&mut records.entry(model.to_string()).or_default().quota);
        });
        Ok(())
    }
}

impl CooldownStore for MemoryStateStore {
    fn cooldown(&self, model: &str) -> Result<CooldownState> {
        Ok(self.with_records(|records| {
            records
                .get(model)
                .map(|r| r.cooldown.clone())
                .unwrap_or_default()
        }))
    }

    fn set_cooldown(&self, model: &str, state: &CooldownState) -> Result<()> {
        self.with_records(|records| {
            records.entry(model.to_string()).or_default().cooldown = state.clone();
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unknown_model_has_default_state() {
        let store = MemoryStateStore::new();
        assert_eq!(store.quota("x/y").unwrap(), QuotaState::default());
        assert_eq!(store.cooldown("x/y").unwrap(), CooldownState::default());
    }

    #[test]
    fn modify_quota_persists_changes() {
        let store = MemoryStateStore::new();
        store
            .modify_quota("groq/a", &mut |state| state.day_count += 2)
            .unwrap();
        assert_eq!(store.quota("groq/a").unwrap().day_count, 2);
        assert_eq!(store.quota("groq/b").unwrap().day_count, 0);
    }

    #[test]
    fn concurrent_modifications_are_not_lost() {
        let store = Arc::new(MemoryStateStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .modify_quota("m", &mut |state| state.day_count += 1)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.quota("m").unwrap().day_count, 800);
    }

    #[test]
    fn window_accessors_follow_recent() {
        let now = Utc::now();
        let state = QuotaState {
            recent: vec![now, now + chrono::Duration::seconds(5)],
            ..QuotaState::default()
        };
        assert_eq!(state.window_start(), Some(now));
        assert_eq!(state.count_in_window(), 2);
    }
}
