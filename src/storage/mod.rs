//! Storage for configuration, quota/cooldown state and the attempt log.

pub mod attempt_log;
pub mod config;
pub mod paths;
pub mod schema;
pub mod sqlite;
pub mod state_store;

pub use attempt_log::{AttemptRecorder, MemoryAttemptLog, NullAttemptLog};
pub use config::{Config, ENV_CONFIG, ENV_COOLDOWN_SECS, ENV_STATE_DB};
pub use paths::AppPaths;
pub use schema::{DEFAULT_ATTEMPT_RETENTION_DAYS, cleanup_old_attempts, run_migrations};
pub use sqlite::{SqliteStateStore, StoredAttempt};
pub use state_store::{
    CooldownState, CooldownStore, MemoryStateStore, QuotaState, QuotaStore, StateStore,
};
