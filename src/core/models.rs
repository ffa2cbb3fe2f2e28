//! Core data models shared by the dispatcher and the convergence loop.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::registry::Provider;
use crate::error::{FolioError, Result};
use crate::util::hash::short_digest;

/// Default retry budget for transient failures on one candidate.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Default maximum output size in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Highest temperature any supported provider accepts.
pub const MAX_TEMPERATURE: f32 = 2.0;

// =============================================================================
// Task Type
// =============================================================================

/// Classification of a generation request.
///
/// Selects candidate models and prompting style. The set is open: task names
/// outside the known variants are carried as [`TaskType::Other`] and routed
/// with the default ordering unless the config defines a route for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskType {
    Fast,
    Creative,
    Analytical,
    General,
    PlagiarismCheck,
    ChapterRewrite,
    ChapterExtension,
    Other(String),
}

impl TaskType {
    /// Known task types in documentation order.
    pub const KNOWN: &'static [Self] = &[
        Self::Fast,
        Self::Creative,
        Self::Analytical,
        Self::General,
        Self::PlagiarismCheck,
        Self::ChapterRewrite,
        Self::ChapterExtension,
    ];

    /// Stable wire/config name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fast => "fast",
            Self::Creative => "creative",
            Self::Analytical => "analytical",
            Self::General => "general",
            Self::PlagiarismCheck => "plagiarism_check",
            Self::ChapterRewrite => "chapter_rewrite",
            Self::ChapterExtension => "chapter_extension",
            Self::Other(name) => name,
        }
    }

    /// Parse a task name. Never fails; unknown names become `Other`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        Self::KNOWN
            .iter()
            .find(|t| t.as_str() == normalized)
            .cloned()
            .unwrap_or(Self::Other(normalized))
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Request
// =============================================================================

/// Shape of the output a request asks for.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseFormat {
    /// Free text.
    #[default]
    Text,
    /// A JSON object matching `schema` (JSON Schema subset understood by the
    /// providers). Adapters request schema-constrained output where the
    /// provider supports it.
    Json { schema: serde_json::Value },
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Stable reference used in the attempt log.
    pub id: String,
    pub prompt: String,
    pub system: Option<String>,
    pub task: TaskType,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Retries per candidate for transient failures.
    pub retry_budget: u32,
    /// Model tried first, ahead of the registry ordering.
    pub forced_model: Option<String>,
    /// When false, only the forced model is tried.
    pub allow_fallback: bool,
    pub format: ResponseFormat,
}

impl Request {
    /// Create a request with default sampling settings.
    #[must_use]
    pub fn new(task: TaskType, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let id = short_digest(&format!("{task}\n{prompt}"));
        Self {
            id,
            prompt,
            system: None,
            task,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            forced_model: None,
            allow_fallback: true,
            format: ResponseFormat::Text,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    #[must_use]
    pub fn with_forced_model(mut self, model: impl Into<String>) -> Self {
        self.forced_model = Some(model.into());
        self
    }

    /// Restrict the request to its forced model.
    #[must_use]
    pub const fn without_fallback(mut self) -> Self {
        self.allow_fallback = false;
        self
    }

    #[must_use]
    pub fn with_json_schema(mut self, schema: serde_json::Value) -> Self {
        self.format = ResponseFormat::Json { schema };
        self
    }

    /// Check the request before any provider is contacted.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::InvalidRequest`] for an empty prompt, a
    /// temperature outside `[0, 2]`, a zero output size, or a disabled
    /// fallback without a forced model.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(FolioError::InvalidRequest("prompt is empty".to_string()));
        }
        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature)
        {
            return Err(FolioError::InvalidRequest(format!(
                "temperature {} outside [0, {MAX_TEMPERATURE}]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(FolioError::InvalidRequest(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        if !self.allow_fallback && self.forced_model.is_none() {
            return Err(FolioError::InvalidRequest(
                "fallback disabled but no model forced".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Attempt
// =============================================================================

/// How a single adapter call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    RateLimited,
    TransientError,
    FatalError,
    /// The provider answered but nothing survived normalization.
    EmptyResponse,
}

impl OutcomeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::RateLimited => "rate_limited",
            Self::TransientError => "transient_error",
            Self::FatalError => "fatal_error",
            Self::EmptyResponse => "empty_response",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one adapter call, kept for observability and cost accounting.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub request_id: String,
    pub task: TaskType,
    /// SHA-256 of the prompt; the prompt itself is never persisted.
    pub prompt_sha256: String,
    pub model: String,
    pub provider: Provider,
    pub outcome: OutcomeKind,
    pub raw_response: Option<String>,
    pub normalized: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// 0 for the first call on a candidate, 1.. for backoff retries.
    pub retry_index: u32,
}

// =============================================================================
// Quality Report
// =============================================================================

/// Plagiarism/originality risk assigned by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Case-insensitive parse.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" | "MODERATE" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`QualityReport`] was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSource {
    /// Typed JSON matching the report schema.
    Structured,
    /// Best-effort `KEY: value` extraction from free text.
    Fallback,
}

/// Result of one originality check.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    /// 1 (copied) to 10 (fully original).
    pub originality_score: u8,
    pub risk: RiskLevel,
    /// Always counted locally, never taken from the checker.
    pub word_count: usize,
    pub issues_found: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub source: ReportSource,
}

impl QualityReport {
    /// Ordering key for "best report seen": lower risk first, then higher score.
    #[must_use]
    pub fn rank(&self) -> (RiskLevel, std::cmp::Reverse<u8>) {
        (self.risk, std::cmp::Reverse(self.originality_score))
    }
}

// =============================================================================
// Content Unit
// =============================================================================

/// Lifecycle status of a content unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Draft,
    Checked,
    Rewriting,
    Accepted,
}

/// How a unit reached `Accepted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Passed the full acceptance predicate.
    Earned,
    /// Passed the relaxed originality threshold after repeated rewrites.
    Relaxed,
    /// Budget exhausted or checks unavailable; quality is degraded.
    Forced { reason: String },
}

impl Acceptance {
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        matches!(self, Self::Forced { .. })
    }
}

/// A piece of long-form content (e.g. a chapter) driven to acceptance.
#[derive(Debug, Clone)]
pub struct ContentUnit {
    pub id: String,
    pub title: String,
    pub body: String,
    pub status: UnitStatus,
    pub rewrite_attempts: u32,
    pub expansion_attempts: u32,
    /// Previous bodies, oldest first; pushed before every replacement.
    pub backups: Vec<String>,
    pub last_report: Option<QualityReport>,
    pub acceptance: Option<Acceptance>,
}

impl ContentUnit {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            status: UnitStatus::Draft,
            rewrite_attempts: 0,
            expansion_attempts: 0,
            backups: Vec::new(),
            last_report: None,
            acceptance: None,
        }
    }

    /// Replace the body, backing up the previous one.
    pub fn replace_body(&mut self, body: String) {
        let previous = std::mem::replace(&mut self.body, body);
        self.backups.push(previous);
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.status == UnitStatus::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_known_names() {
        for task in TaskType::KNOWN {
            assert_eq!(&TaskType::parse(task.as_str()), task);
        }
    }

    #[test]
    fn task_type_unknown_name_is_other() {
        assert_eq!(
            TaskType::parse("Outline-Draft"),
            TaskType::Other("outline_draft".to_string())
        );
    }

    #[test]
    fn task_type_serde_uses_names() {
        let json = serde_json::to_string(&TaskType::PlagiarismCheck).unwrap();
        assert_eq!(json, "\"plagiarism_check\"");
        let parsed: TaskType = serde_json::from_str("\"chapter-rewrite\"").unwrap();
        assert_eq!(parsed, TaskType::ChapterRewrite);
    }

    #[test]
    fn request_id_is_stable_for_same_input() {
        let a = Request::new(TaskType::Fast, "hello");
        let b = Request::new(TaskType::Fast, "hello");
        let c = Request::new(TaskType::Creative, "hello");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn request_validation() {
        assert!(Request::new(TaskType::Fast, "hi").validate().is_ok());
        assert!(Request::new(TaskType::Fast, "   ").validate().is_err());
        assert!(
            Request::new(TaskType::Fast, "hi")
                .with_temperature(2.5)
                .validate()
                .is_err()
        );
        assert!(
            Request::new(TaskType::Fast, "hi")
                .with_max_tokens(0)
                .validate()
                .is_err()
        );
        assert!(
            Request::new(TaskType::Fast, "hi")
                .without_fallback()
                .validate()
                .is_err()
        );
    }

    #[test]
    fn risk_level_parse_and_order() {
        assert_eq!(RiskLevel::parse("medium"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("unknown"), None);
        assert!(RiskLevel::Low < RiskLevel::High);
    }

    #[test]
    fn report_rank_prefers_lower_risk_then_higher_score() {
        let base = QualityReport {
            originality_score: 6,
            risk: RiskLevel::Medium,
            word_count: 100,
            issues_found: true,
            issues: vec![],
            suggestions: vec![],
            source: ReportSource::Structured,
        };
        let better_score = QualityReport {
            originality_score: 8,
            ..base.clone()
        };
        let lower_risk = QualityReport {
            risk: RiskLevel::Low,
            originality_score: 3,
            ..base.clone()
        };
        assert!(better_score.rank() < base.rank());
        assert!(lower_risk.rank() < better_score.rank());
    }

    #[test]
    fn replace_body_keeps_backup() {
        let mut unit = ContentUnit::new("ch1", "One", "first");
        unit.replace_body("second".to_string());
        assert_eq!(unit.body, "second");
        assert_eq!(unit.backups, vec!["first".to_string()]);
    }
}
