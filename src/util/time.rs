//! Time formatting utilities.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Format a countdown from `now` to a future time.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = target.signed_duration_since(now);

    if duration.num_seconds() <= 0 {
        return "now".to_string();
    }

    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;

    if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else if minutes > 0 {
        format!("in {minutes}m {}s", duration.num_seconds() % 60)
    } else {
        format!("in {}s", duration.num_seconds())
    }
}

/// Format a wait duration compactly (`850ms`, `12s`, `1m 5s`).
#[must_use]
pub fn format_wait(wait: Duration) -> String {
    let secs = wait.as_secs();
    if secs == 0 {
        format!("{}ms", wait.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
