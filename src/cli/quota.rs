//! `folio quota`: per-model quota and cooldown state.

use serde::Serialize;

use super::args::{OutputFormat, QuotaArgs};
use super::{Runtime, print_json};
use crate::core::clock::Clock;
use crate::core::cooldown::CooldownTracker;
use crate::core::quota::{QuotaStatus, QuotaTracker};
use crate::core::registry::ModelSpec;
use crate::error::{FolioError, Result};
use crate::storage::sqlite::StoredAttempt;
use crate::util::{format_countdown, format_wait};

/// One model's state for display.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaRow {
    pub model: String,
    pub used_in_window: u32,
    pub per_minute_limit: u32,
    pub used_today: u32,
    pub per_day_limit: u32,
    pub window_resets_at: Option<String>,
    pub cooldown_remaining_secs: u64,
}

impl QuotaRow {
    fn new(status: QuotaStatus, cooldown_secs: u64) -> Self {
        Self {
            model: status.model,
            used_in_window: status.used_in_window,
            per_minute_limit: status.per_minute_limit,
            used_today: status.used_today,
            per_day_limit: status.per_day_limit,
            window_resets_at: status.window_resets_at.map(|t| t.to_rfc3339()),
            cooldown_remaining_secs: cooldown_secs,
        }
    }

    #[must_use]
    pub const fn exhausted_today(&self) -> bool {
        self.used_today >= self.per_day_limit
    }
}

#[derive(Debug, Serialize)]
struct QuotaJson<'a> {
    models: &'a [QuotaRow],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    attempts: &'a [StoredAttempt],
}

/// Snapshot quota and cooldown state for `models`.
///
/// # Errors
///
/// Returns a storage error if state cannot be read.
pub fn collect(
    models: &[&ModelSpec],
    quota: &QuotaTracker,
    cooldown: &CooldownTracker,
) -> Result<Vec<QuotaRow>> {
    models
        .iter()
        .map(|model| {
            let status = quota.status(model)?;
            let remaining = cooldown.remaining(&model.id)?;
            Ok(QuotaRow::new(status, remaining.as_secs()))
        })
        .collect()
}

fn render_human(rows: &[QuotaRow], attempts: &[StoredAttempt], clock: &dyn Clock) -> String {
    let width = rows.iter().map(|r| r.model.len()).max().unwrap_or(5).max(5);
    let mut out = format!(
        "{:<width$}  {:>9}  {:>13}  status\n",
        "model", "minute", "today"
    );
    let now = clock.now();
    for row in rows {
        let status = if row.exhausted_today() {
            "daily limit reached".to_string()
        } else if row.cooldown_remaining_secs > 0 {
            format!(
                "cooling down ({})",
                format_wait(std::time::Duration::from_secs(row.cooldown_remaining_secs))
            )
        } else if row.used_in_window >= row.per_minute_limit {
            let reset = row
                .window_resets_at
                .as_deref()
                .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
                .map_or_else(String::new, |t| {
                    format_countdown(t.with_timezone(&chrono::Utc), now)
                });
            format!("window full, frees {reset}")
        } else {
            "available".to_string()
        };
        out.push_str(&format!(
            "{:<width$}  {:>4}/{:<4}  {:>6}/{:<6}  {status}\n",
            row.model, row.used_in_window, row.per_minute_limit, row.used_today, row.per_day_limit
        ));
    }

    if !attempts.is_empty() {
        out.push_str("\nRecent attempts:\n");
        for a in attempts {
            out.push_str(&format!(
                "  {}  {:<width$}  {:<16} {:>6}ms  {}\n",
                a.started_at,
                a.model,
                a.outcome,
                a.duration_ms,
                a.error.as_deref().unwrap_or("")
            ));
        }
    }
    out
}

/// Execute the quota command.
///
/// # Errors
///
/// Returns an error for an unknown `--model` or unreadable state.
pub fn execute(
    args: &QuotaArgs,
    runtime: &Runtime,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let models: Vec<&ModelSpec> = match &args.model {
        Some(id) => vec![
            runtime
                .registry
                .model(id)
                .ok_or_else(|| FolioError::UnknownModel(id.clone()))?,
        ],
        None => runtime.registry.models().iter().collect(),
    };

    let quota = QuotaTracker::new(runtime.store.clone(), runtime.clock.clone())
        .with_window(runtime.config.quota_window());
    let cooldown = CooldownTracker::new(runtime.store.clone(), runtime.clock.clone())
        .with_duration(runtime.config.cooldown());

    let rows = collect(&models, &quota, &cooldown)?;
    let attempts = if args.attempts > 0 {
        runtime.store.recent_attempts(args.attempts)?
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Human => print!("{}", render_human(&rows, &attempts, runtime.clock.as_ref())),
        OutputFormat::Json => print_json(
            &QuotaJson {
                models: &rows,
                attempts: &attempts,
            },
            pretty,
        )?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::registry::{CostClass, Provider};
    use crate::storage::state_store::MemoryStateStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn rows_reflect_reservations_and_cooldowns() {
        let store = Arc::new(MemoryStateStore::new());
        let clock = Arc::new(ManualClock::new());
        let quota = QuotaTracker::new(store.clone(), clock.clone());
        let cooldown = CooldownTracker::new(store, clock.clone());
        let model = ModelSpec::new(Provider::Groq, "m", 1, 10, CostClass::Fast, &[]);

        quota.reserve(&model).unwrap();
        cooldown.record_rate_limit(&model.id, None).unwrap();

        let rows = collect(&[&model], &quota, &cooldown).unwrap();
        assert_eq!(rows[0].used_in_window, 1);
        assert_eq!(rows[0].used_today, 1);
        assert_eq!(rows[0].cooldown_remaining_secs, 60);

        let text = render_human(&rows, &[], clock.as_ref());
        assert!(text.contains("cooling down (1m 0s)"));

        clock.advance(Duration::from_secs(61));
        let rows = collect(&[&model], &quota, &cooldown).unwrap();
        assert_eq!(rows[0].used_in_window, 0);
        assert_eq!(rows[0].cooldown_remaining_secs, 0);
        assert!(render_human(&rows, &[], clock.as_ref()).contains("available"));
    }

    #[test]
    fn exhausted_day_is_reported() {
        let store = Arc::new(MemoryStateStore::new());
        let clock = Arc::new(ManualClock::new());
        let quota = QuotaTracker::new(store.clone(), clock.clone());
        let cooldown = CooldownTracker::new(store, clock.clone());
        let model = ModelSpec::new(Provider::Gemini, "p", 10, 1, CostClass::Premium, &[]);

        quota.reserve(&model).unwrap();
        let rows = collect(&[&model], &quota, &cooldown).unwrap();
        assert!(rows[0].exhausted_today());
        assert!(render_human(&rows, &[], clock.as_ref()).contains("daily limit reached"));
    }
}
