//! Doctor diagnostic framework.
//!
//! Defines the data structures for setup and provider health checks.

pub mod checks;

use crate::core::registry::Provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result of a single diagnostic check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Pass { details: Option<String> },
    /// Working, but worth a look.
    Warning {
        details: String,
        suggestion: Option<String>,
    },
    Fail {
        reason: String,
        suggestion: Option<String>,
    },
    /// Not applicable (e.g. provider disabled).
    Skipped { reason: String },
    Timeout { after: Duration },
}

impl CheckStatus {
    /// Whether this status indicates the check is functional.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(
            self,
            Self::Pass { .. } | Self::Warning { .. } | Self::Skipped { .. }
        )
    }

    /// Whether this status requires attention (warning or worse).
    #[must_use]
    pub const fn needs_attention(&self) -> bool {
        matches!(
            self,
            Self::Warning { .. } | Self::Fail { .. } | Self::Timeout { .. }
        )
    }

    /// Short label for tables.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pass { .. } => "ok",
            Self::Warning { .. } => "warn",
            Self::Fail { .. } => "FAIL",
            Self::Skipped { .. } => "skip",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { details: Some(details) } => write!(f, "pass ({details})"),
            Self::Pass { details: None } => write!(f, "pass"),
            Self::Warning {
                details,
                suggestion: Some(suggestion),
            } => write!(f, "warning: {details} (suggestion: {suggestion})"),
            Self::Warning { details, .. } => write!(f, "warning: {details}"),
            Self::Fail {
                reason,
                suggestion: Some(suggestion),
            } => write!(f, "fail: {reason} (suggestion: {suggestion})"),
            Self::Fail { reason, .. } => write!(f, "fail: {reason}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Timeout { after } => write!(f, "timeout after {}s", after.as_secs()),
        }
    }
}

/// A single diagnostic check result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCheck {
    pub name: String,
    pub status: CheckStatus,
    pub duration: Option<Duration>,
}

impl DiagnosticCheck {
    #[must_use]
    pub fn new(name: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            name: name.into(),
            status,
            duration: None,
        }
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Health of one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: Provider,
    pub credentials: DiagnosticCheck,
    pub reachable: DiagnosticCheck,
}

impl ProviderHealth {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.credentials.status.is_ready() && self.reachable.status.is_ready()
    }
}

/// Complete diagnostic report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DoctorReport {
    pub version: String,
    pub config_status: DiagnosticCheck,
    pub state_db: DiagnosticCheck,
    pub providers: Vec<ProviderHealth>,
    pub total_duration: Duration,
}

impl DoctorReport {
    /// Returns (`ready_count`, `needs_attention_count`).
    ///
    /// Providers count once each; config and state database checks add one
    /// needs-attention entry each when not ready.
    #[must_use]
    pub fn summary(&self) -> (usize, usize) {
        let mut ready = 0;
        let mut needs_attention = usize::from(self.config_status.status.needs_attention())
            + usize::from(self.state_db.status.needs_attention());

        for provider in &self.providers {
            if provider.is_ready() {
                ready += 1;
            } else {
                needs_attention += 1;
            }
        }

        (ready, needs_attention)
    }

    /// Whether at least one provider can serve requests.
    #[must_use]
    pub fn any_provider_ready(&self) -> bool {
        self.providers.iter().any(|p| {
            p.is_ready() && !matches!(p.reachable.status, CheckStatus::Skipped { .. })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> DiagnosticCheck {
        DiagnosticCheck::new("ok", CheckStatus::Pass { details: None })
    }

    fn report(providers: Vec<ProviderHealth>) -> DoctorReport {
        DoctorReport {
            version: "0.1.0".to_string(),
            config_status: ok(),
            state_db: ok(),
            providers,
            total_duration: Duration::from_secs(1),
        }
    }

    #[test]
    fn check_status_display_formats() {
        let fail = CheckStatus::Fail {
            reason: "no key".to_string(),
            suggestion: Some("set GROQ_API_KEY".to_string()),
        };
        assert!(fail.to_string().contains("set GROQ_API_KEY"));
        assert!(
            CheckStatus::Timeout {
                after: Duration::from_secs(5)
            }
            .to_string()
            .contains("timeout after 5s")
        );
        assert_eq!(CheckStatus::Pass { details: None }.to_string(), "pass");
    }

    #[test]
    fn summary_counts_providers_and_setup() {
        let bad = DiagnosticCheck::new(
            "bad",
            CheckStatus::Fail {
                reason: "nope".to_string(),
                suggestion: None,
            },
        );
        let mut r = report(vec![
            ProviderHealth {
                provider: Provider::Ollama,
                credentials: ok(),
                reachable: ok(),
            },
            ProviderHealth {
                provider: Provider::Groq,
                credentials: bad.clone(),
                reachable: ok(),
            },
        ]);
        assert_eq!(r.summary(), (1, 1));
        assert!(r.any_provider_ready());

        r.state_db = bad;
        assert_eq!(r.summary(), (1, 2));
    }

    #[test]
    fn skipped_providers_do_not_count_as_usable() {
        let skipped = DiagnosticCheck::new(
            "skip",
            CheckStatus::Skipped {
                reason: "disabled".to_string(),
            },
        );
        let r = report(vec![ProviderHealth {
            provider: Provider::OpenRouter,
            credentials: skipped.clone(),
            reachable: skipped,
        }]);
        assert!(!r.any_provider_ready());
    }

    #[test]
    fn report_serializes_camel_case() {
        let json = serde_json::to_string(&report(Vec::new())).unwrap();
        assert!(json.contains("\"configStatus\""));
        assert!(json.contains("\"stateDb\""));
    }
}
