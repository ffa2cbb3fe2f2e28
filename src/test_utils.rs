//! Test utilities for folio.
//!
//! Provides a scripted provider adapter, registry and content factories, and
//! a temporary directory helper for use across all test modules.
//!
//! # Usage
//!
//! ```rust,ignore
//! use folio::test_utils::*;
//!
//! let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq));
//! adapter.push_text("groq/writer", "Once upon a time.");
//! let body = words(2200);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::core::models::{QualityReport, ReportSource, RiskLevel, TaskType};
use crate::core::registry::{CostClass, ModelSpec, Provider, ProviderRegistry};
use crate::providers::{AdapterMap, AdapterOutcome, GenerationAdapter, GenerationCall};

pub use crate::core::clock::ManualClock;

// =============================================================================
// Scripted Adapter
// =============================================================================

/// A call observed by [`ScriptedAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub wants_json: bool,
}

/// Adapter that replays queued outcomes per model id and records every call.
///
/// When a model's queue is empty the default outcome is returned (a fatal
/// error unless set with [`ScriptedAdapter::with_default`]).
#[derive(Debug)]
pub struct ScriptedAdapter {
    provider: Provider,
    scripts: Mutex<HashMap<String, VecDeque<AdapterOutcome>>>,
    calls: Mutex<Vec<RecordedCall>>,
    default: AdapterOutcome,
}

impl ScriptedAdapter {
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            default: AdapterOutcome::FatalError("no scripted outcome".to_string()),
        }
    }

    /// Outcome returned once a model's queue runs dry.
    #[must_use]
    pub fn with_default(mut self, outcome: AdapterOutcome) -> Self {
        self.default = outcome;
        self
    }

    /// Queue an outcome for `model`.
    pub fn push(&self, model: &str, outcome: AdapterOutcome) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(model.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Queue a successful response for `model`.
    pub fn push_text(&self, model: &str, text: impl Into<String>) {
        self.push(model, AdapterOutcome::Success(text.into()));
    }

    /// Number of calls made to `model`.
    #[must_use]
    pub fn calls(&self, model: &str) -> usize {
        self.recorded().iter().filter(|c| c.model == model).count()
    }

    /// Every call in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(&self, model: &ModelSpec, call: &GenerationCall<'_>) -> AdapterOutcome {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                model: model.id.clone(),
                prompt: call.prompt.to_string(),
                system: call.system.map(str::to_string),
                temperature: call.temperature,
                max_tokens: call.max_tokens,
                wants_json: call.schema().is_some(),
            });

        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&model.id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Adapter map holding one scripted adapter.
#[must_use]
pub fn single_adapter(adapter: Arc<ScriptedAdapter>) -> AdapterMap {
    let mut adapters: AdapterMap = HashMap::new();
    adapters.insert(adapter.provider(), adapter);
    adapters
}

// =============================================================================
// Registry Factories
// =============================================================================

/// Model id of the checker in [`make_test_convergence_registry`].
pub const TEST_CHECKER: &str = "groq/checker";
/// Model id of the rewriter in [`make_test_convergence_registry`].
pub const TEST_WRITER: &str = "groq/writer";
/// Model id of the expander in [`make_test_convergence_registry`].
pub const TEST_EXPANDER: &str = "groq/expander";

/// A model on `provider` with generous limits.
#[must_use]
pub fn make_test_model(provider: Provider, name: &str, tags: &[TaskType]) -> ModelSpec {
    ModelSpec::new(provider, name, 1_000, 100_000, CostClass::Standard, tags)
}

/// Registry routing checks, rewrites and expansions to one model each, all
/// on Groq, with no fallback between them.
///
/// # Panics
///
/// Panics if the registry is inconsistent (it never is).
#[must_use]
pub fn make_test_convergence_registry() -> ProviderRegistry {
    let models = vec![
        make_test_model(Provider::Groq, "checker", &[TaskType::PlagiarismCheck]),
        make_test_model(Provider::Groq, "writer", &[TaskType::ChapterRewrite]),
        make_test_model(Provider::Groq, "expander", &[TaskType::ChapterExtension]),
    ];
    let routes = HashMap::from([
        ("plagiarism_check".to_string(), vec![TEST_CHECKER.to_string()]),
        ("chapter_rewrite".to_string(), vec![TEST_WRITER.to_string()]),
        ("chapter_extension".to_string(), vec![TEST_EXPANDER.to_string()]),
    ]);
    ProviderRegistry::new(models, routes)
        .expect("test registry is consistent")
        .with_general_fallback(false)
}

// =============================================================================
// Content Factories
// =============================================================================

/// `count` distinct words of plain prose.
#[must_use]
pub fn words(count: usize) -> String {
    (0..count)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// JSON checker response in the report schema.
#[must_use]
pub fn make_test_report_json(score: u8, risk: RiskLevel, issues_found: bool) -> String {
    let issues: Vec<&str> = if issues_found {
        vec!["close paraphrase"]
    } else {
        Vec::new()
    };
    serde_json::json!({
        "originality_score": score,
        "risk_level": risk.as_str(),
        "issues_found": issues_found,
        "issues": issues,
        "suggestions": ["vary sentence structure"],
    })
    .to_string()
}

/// A parsed report with the given fields.
#[must_use]
pub fn make_test_report(score: u8, risk: RiskLevel, word_count: usize) -> QualityReport {
    QualityReport {
        originality_score: score,
        risk,
        word_count,
        issues_found: risk == RiskLevel::High,
        issues: Vec::new(),
        suggestions: Vec::new(),
        source: ReportSource::Structured,
    }
}

/// Minimal config file exercising every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"
[general]
log_level = "debug"

[dispatch]
retry_budget = 2
cooldown_secs = 30
max_quota_wait_secs = 10

[quality]
min_words = 500
max_attempts = 3

[providers.openrouter]
enabled = false

[[models]]
provider = "groq"
name = "custom-model"
per_minute_limit = 5
per_day_limit = 50
class = "fast"
tags = ["outline"]

[routes]
outline = ["groq/custom-model"]
"#
    .to_string()
}

// =============================================================================
// Temporary Directories
// =============================================================================

/// Isolated temporary directory removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file, including parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
