//! State database schema and migrations.
//!
//! Defines the `SQLite` schema for per-model quota/cooldown state and the
//! attempt log, plus migration and retention helpers.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::error::{FolioError, Result};

const STATE_MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("../../migrations/001_model_state.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("../../migrations/002_attempts.sql"),
    },
];

/// Default retention window for the attempt log.
pub const DEFAULT_ATTEMPT_RETENTION_DAYS: i64 = 30;

/// Run schema migrations for the state database.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in STATE_MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

/// Delete attempt rows that started before `now - retention_days`.
///
/// Returns the number of rows deleted.
///
/// # Errors
/// Returns an error if `retention_days` is non-positive or the DELETE fails.
pub fn cleanup_old_attempts(
    conn: &Connection,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<usize> {
    if retention_days <= 0 {
        return Err(FolioError::Config(
            "Retention days must be greater than 0".to_string(),
        ));
    }

    let cutoff = (now - Duration::days(retention_days)).to_rfc3339();

    conn.execute("DELETE FROM attempts WHERE started_at < ?1", [cutoff])
        .map_err(|e| FolioError::Storage(format!("attempt cleanup failed: {e}")))
}

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| FolioError::Storage(format!("create schema_migrations: {e}")))
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| FolioError::Storage(format!("read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| FolioError::Storage(format!("begin migration: {e}")))?;

    tx.execute_batch(migration.sql).map_err(|e| {
        FolioError::Storage(format!("apply migration {}: {e}", migration.version))
    })?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| FolioError::Storage(format!("record migration {}: {e}", migration.version)))?;

    tx.commit()
        .map_err(|e| FolioError::Storage(format!("commit migration {}: {e}", migration.version)))
}
