//! `SQLite`-backed state store and attempt log.
//!
//! Quota updates run inside `BEGIN IMMEDIATE` transactions, so concurrent
//! callers in this process (serialized by the connection mutex) and in other
//! processes sharing the database file never interleave a read-modify-write.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::attempt_log::AttemptRecorder;
use super::schema::{cleanup_old_attempts, run_migrations};
use super::state_store::{CooldownState, CooldownStore, QuotaState, QuotaStore};
use crate::core::models::Attempt;
use crate::error::{FolioError, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A row of the attempt log.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredAttempt {
    pub id: i64,
    pub request_id: String,
    pub task: String,
    pub model: String,
    pub outcome: String,
    pub retry_index: u32,
    pub started_at: String,
    pub duration_ms: i64,
    pub error: Option<String>,
}

/// Durable state database.
#[derive(Debug)]
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Create or open a state database at the given path.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, the database
    /// cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| FolioError::Storage(format!("open state db: {e}")))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory state database (for testing).
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| FolioError::Storage(format!("open in-memory db: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Model ids that have any stored state, sorted.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn known_models(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached("SELECT model_id FROM model_state ORDER BY model_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .map_err(FolioError::from)
    }

    /// Most recent attempts, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_attempts(&self, limit: usize) -> Result<Vec<StoredAttempt>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, request_id, task, model_id, outcome, retry_index, started_at, \
             duration_ms, error FROM attempts ORDER BY id DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], |row| {
            Ok(StoredAttempt {
                id: row.get(0)?,
                request_id: row.get(1)?,
                task: row.get(2)?,
                model: row.get(3)?,
                outcome: row.get(4)?,
                retry_index: row.get(5)?,
                started_at: row.get(6)?,
                duration_ms: row.get(7)?,
                error: row.get(8)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(FolioError::from)
    }

    /// Delete attempts older than the retention window.
    ///
    /// # Errors
    /// Returns an error if `retention_days` is non-positive or the DELETE fails.
    pub fn cleanup_attempts(&self, retention_days: i64, now: DateTime<Utc>) -> Result<usize> {
        cleanup_old_attempts(&self.lock(), retention_days, now)
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FolioError::Storage(format!("invalid timestamp '{value}': {e}")))
}

fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| FolioError::Storage(format!("invalid day anchor '{value}': {e}")))
}

fn read_quota(conn: &Connection, model: &str) -> Result<QuotaState> {
    let row: Option<(String, Option<String>, u32)> = conn
        .prepare_cached(
            "SELECT recent_reservations, day_anchor, day_count FROM model_state WHERE model_id = ?1",
        )?
        .query_row([model], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .optional()?;

    let Some((recent, day_anchor, day_count)) = row else {
        return Ok(QuotaState::default());
    };

    Ok(QuotaState {
        recent: serde_json::from_str(&recent)?,
        day_count,
        day_anchor: day_anchor.as_deref().map(parse_day).transpose()?,
    })
}

fn write_quota(conn: &Connection, model: &str, state: &QuotaState) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO model_state (model_id, recent_reservations, day_anchor, day_count, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(model_id) DO UPDATE SET \
            recent_reservations = excluded.recent_reservations, \
            day_anchor = excluded.day_anchor, \
            day_count = excluded.day_count, \
            updated_at = excluded.updated_at",
    )?
    .execute(params![
        model,
        serde_json::to_string(&state.recent)?,
        state.day_anchor.map(|d| d.format("%Y-%m-%d").to_string()),
        state.day_count,
        Utc::now().to_rfc3339(),
    ])?;
    Ok(())
}

impl QuotaStore for SqliteStateStore {
    fn quota(&self, model: &str) -> Result<QuotaState> {
        read_quota(&self.lock(), model)
    }

    fn modify_quota(&self, model: &str, update: &mut dyn FnMut(&mut QuotaState)) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut state = read_quota(&tx, model)?;
        update(&mut state);
        write_quota(&tx, model, &state)?;

        tx.commit()?;
        Ok(())
    }
}

impl CooldownStore for SqliteStateStore {
    fn cooldown(&self, model: &str) -> Result<CooldownState> {
        let conn = self.lock();
        let row: Option<(Option<String>, Option<String>)> = conn
            .prepare_cached(
                "SELECT last_rate_limit, cooldown_until FROM model_state WHERE model_id = ?1",
            )?
            .query_row([model], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((last, until)) = row else {
            return Ok(CooldownState::default());
        };

        Ok(CooldownState {
            last_rate_limit: last.as_deref().map(parse_timestamp).transpose()?,
            until: until.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn set_cooldown(&self, model: &str, state: &CooldownState) -> Result<()> {
        self.lock()
            .prepare_cached(
                "INSERT INTO model_state (model_id, last_rate_limit, cooldown_until, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(model_id) DO UPDATE SET \
                    last_rate_limit = excluded.last_rate_limit, \
                    cooldown_until = excluded.cooldown_until, \
                    updated_at = excluded.updated_at",
            )?
            .execute(params![
                model,
                state.last_rate_limit.map(|t| t.to_rfc3339()),
                state.until.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ])?;
        Ok(())
    }
}

impl AttemptRecorder for SqliteStateStore {
    fn record(&self, attempt: &Attempt) -> Result<()> {
        let response_chars = attempt
            .raw_response
            .as_ref()
            .map(|r| i64::try_from(r.chars().count()).unwrap_or(i64::MAX));

        self.lock()
            .prepare_cached(
                "INSERT INTO attempts (request_id, task, prompt_sha256, model_id, provider, \
                 outcome, retry_index, started_at, duration_ms, response_chars, error) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?
            .execute(params![
                attempt.request_id,
                attempt.task.as_str(),
                attempt.prompt_sha256,
                attempt.model,
                attempt.provider.cli_name(),
                attempt.outcome.as_str(),
                attempt.retry_index,
                attempt.started_at.to_rfc3339(),
                i64::try_from(attempt.duration_ms).unwrap_or(i64::MAX),
                response_chars,
                attempt.error,
            ])?;
        Ok(())
    }
}
