//! Provider and model registry.
//!
//! Defines the supported providers, the model table with rate limits and
//! task affinity, and the task-type → ordered-candidates routing table.
//! Candidate order decides cost and latency, so it is computed in one place
//! from configuration rather than at call sites.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use super::models::TaskType;
use crate::error::{FolioError, Result};

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported text-generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local inference daemon.
    Ollama,
    Groq,
    Gemini,
    OpenRouter,
}

/// How requests to a provider are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    /// Unauthenticated (local daemon).
    None,
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// API key in the named header.
    ApiKeyHeader(&'static str),
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::Ollama, Self::Groq, Self::Gemini, Self::OpenRouter];

    /// CLI/config name for this provider.
    #[must_use]
    pub const fn cli_name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::Groq => "Groq",
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
        }
    }

    /// Parse from CLI argument.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::InvalidProvider`] for unknown names.
    pub fn from_cli_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.cli_name() == lower)
            .copied()
            .ok_or_else(|| FolioError::InvalidProvider(name.to_string()))
    }

    /// Default API base URL.
    #[must_use]
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::Ollama => "http://127.0.0.1:11434",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Environment variable holding the API key.
    #[must_use]
    pub const fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Ollama => None,
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
        }
    }

    /// Authentication mechanism.
    #[must_use]
    pub const fn auth(self) -> AuthMechanism {
        match self {
            Self::Ollama => AuthMechanism::None,
            Self::Groq | Self::OpenRouter => AuthMechanism::Bearer,
            Self::Gemini => AuthMechanism::ApiKeyHeader("x-goog-api-key"),
        }
    }

    /// Whether the provider runs on this machine.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Ollama)
    }

    /// Whether the provider accepts a JSON schema for structured output.
    ///
    /// Groq only guarantees JSON mode, not schema adherence.
    #[must_use]
    pub const fn supports_json_schema(self) -> bool {
        !matches!(self, Self::Groq)
    }

    /// Timeout for lightweight health probes.
    #[must_use]
    pub const fn probe_timeout(self) -> Duration {
        match self {
            Self::Ollama => Duration::from_secs(3),
            _ => Duration::from_secs(10),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cli_name())
    }
}

// =============================================================================
// Model Spec
// =============================================================================

/// Relative latency/cost class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostClass {
    /// Runs locally, no per-call cost.
    Local,
    Fast,
    Standard,
    Premium,
}

impl CostClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Fast => "fast",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

/// A specific model offering with its own limits and affinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Identity, `provider/name`.
    pub id: String,
    pub provider: Provider,
    /// Model name sent to the provider API.
    pub name: String,
    pub per_minute_limit: u32,
    pub per_day_limit: u32,
    #[serde(default)]
    pub tags: Vec<TaskType>,
    pub class: CostClass,
    /// Whether schema-constrained JSON output can be requested.
    pub supports_schema: bool,
}

impl ModelSpec {
    /// Build a model whose id is derived from provider and name.
    #[must_use]
    pub fn new(
        provider: Provider,
        name: &str,
        per_minute_limit: u32,
        per_day_limit: u32,
        class: CostClass,
        tags: &[TaskType],
    ) -> Self {
        Self {
            id: format!("{}/{name}", provider.cli_name()),
            provider,
            name: name.to_string(),
            per_minute_limit,
            per_day_limit,
            tags: tags.to_vec(),
            class,
            supports_schema: provider.supports_json_schema(),
        }
    }

    /// Whether this model lists `task` among its affinity tags.
    #[must_use]
    pub fn has_affinity(&self, task: &TaskType) -> bool {
        self.tags.contains(task)
    }
}

// =============================================================================
// Provider Registry
// =============================================================================

/// Read-only table of models and task routes.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    /// Models in general fallback order.
    models: Vec<ModelSpec>,
    /// Task name → ordered model ids.
    routes: HashMap<String, Vec<String>>,
    disabled: HashSet<Provider>,
    /// Append every remaining model after the preferred ones.
    general_fallback: bool,
}

impl ProviderRegistry {
    /// Build a registry, checking that ids are unique and routes reference
    /// known models.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigInvalid`] for duplicate ids, zero limits,
    /// or routes naming unknown models.
    pub fn new(models: Vec<ModelSpec>, routes: HashMap<String, Vec<String>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(FolioError::ConfigInvalid {
                    key: "models".to_string(),
                    message: format!("duplicate model id '{}'", model.id),
                });
            }
            if model.per_minute_limit == 0 || model.per_day_limit == 0 {
                return Err(FolioError::ConfigInvalid {
                    key: format!("models.{}", model.id),
                    message: "rate limits must be greater than 0".to_string(),
                });
            }
        }
        for (task, ids) in &routes {
            if let Some(unknown) = ids.iter().find(|id| !seen.contains(id.as_str())) {
                return Err(FolioError::ConfigInvalid {
                    key: format!("routes.{task}"),
                    message: format!("unknown model '{unknown}'"),
                });
            }
        }

        let routes = routes
            .into_iter()
            .map(|(task, ids)| (TaskType::parse(&task).as_str().to_string(), ids))
            .collect();

        Ok(Self {
            models,
            routes,
            disabled: HashSet::new(),
            general_fallback: true,
        })
    }

    /// The built-in model table and routes.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            models: builtin_models(),
            routes: builtin_routes(),
            disabled: HashSet::new(),
            general_fallback: true,
        }
    }

    /// Exclude every model of the given providers from candidate lists.
    #[must_use]
    pub fn with_disabled(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.disabled.extend(providers);
        self
    }

    /// Whether candidates end with the general fallback order.
    #[must_use]
    pub const fn with_general_fallback(mut self, enabled: bool) -> Self {
        self.general_fallback = enabled;
        self
    }

    /// Look up a model by id.
    #[must_use]
    pub fn model(&self, id: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.id == id)
    }

    /// All models in general fallback order.
    #[must_use]
    pub fn models(&self) -> &[ModelSpec] {
        &self.models
    }

    /// Configured route for a task, if any.
    #[must_use]
    pub fn route(&self, task: &TaskType) -> Option<&[String]> {
        self.routes.get(task.as_str()).map(Vec::as_slice)
    }

    /// Whether the provider is enabled.
    #[must_use]
    pub fn is_enabled(&self, provider: Provider) -> bool {
        !self.disabled.contains(&provider)
    }

    /// Ordered candidates for a task.
    ///
    /// Routed models first (or affinity-tagged models when the task has no
    /// route), then every remaining model in fallback order. Unknown task
    /// types get the fallback order. With general fallback disabled only the
    /// preferred models are returned, unless there are none.
    #[must_use]
    pub fn candidates(&self, task: &TaskType) -> Vec<&ModelSpec> {
        let preferred: Vec<&ModelSpec> = match self.route(task) {
            Some(route) => route.iter().filter_map(|id| self.model(id)).collect(),
            None => self.models.iter().filter(|m| m.has_affinity(task)).collect(),
        };

        let fallback: &[ModelSpec] = if self.general_fallback || preferred.is_empty() {
            &self.models
        } else {
            &[]
        };

        let mut ordered: Vec<&ModelSpec> = Vec::with_capacity(self.models.len());
        for model in preferred.into_iter().chain(fallback) {
            if self.is_enabled(model.provider) && !ordered.iter().any(|m| m.id == model.id) {
                ordered.push(model);
            }
        }
        ordered
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const OLLAMA_8B: &str = "ollama/llama3.1:8b";
const GROQ_8B: &str = "groq/llama-3.1-8b-instant";
const GROQ_70B: &str = "groq/llama-3.3-70b-versatile";
const GEMINI_FLASH: &str = "gemini/gemini-2.0-flash";
const GEMINI_PRO: &str = "gemini/gemini-1.5-pro";
const OPENROUTER_70B: &str = "openrouter/meta-llama/llama-3.3-70b-instruct:free";

/// Built-in models in general fallback order.
#[must_use]
pub fn builtin_models() -> Vec<ModelSpec> {
    use TaskType::{
        Analytical, ChapterExtension, ChapterRewrite, Creative, Fast, General, PlagiarismCheck,
    };

    vec![
        ModelSpec::new(Provider::Ollama, "llama3.1:8b", 60, 100_000, CostClass::Local, &[
            Fast, General,
        ]),
        ModelSpec::new(Provider::Groq, "llama-3.1-8b-instant", 30, 14_400, CostClass::Fast, &[
            Fast,
            Analytical,
            PlagiarismCheck,
        ]),
        ModelSpec::new(
            Provider::Groq,
            "llama-3.3-70b-versatile",
            30,
            1_000,
            CostClass::Standard,
            &[Creative, General, ChapterRewrite, ChapterExtension],
        ),
        ModelSpec::new(Provider::Gemini, "gemini-2.0-flash", 15, 1_500, CostClass::Standard, &[
            Creative,
            Analytical,
            PlagiarismCheck,
            ChapterExtension,
        ]),
        ModelSpec::new(Provider::Gemini, "gemini-1.5-pro", 2, 50, CostClass::Premium, &[
            Creative,
            ChapterRewrite,
        ]),
        ModelSpec::new(
            Provider::OpenRouter,
            "meta-llama/llama-3.3-70b-instruct:free",
            20,
            200,
            CostClass::Standard,
            &[Creative, General],
        ),
    ]
}

/// Built-in task routes.
#[must_use]
pub fn builtin_routes() -> HashMap<String, Vec<String>> {
    let route = |ids: &[&str]| ids.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

    HashMap::from([
        (
            TaskType::Fast.as_str().to_string(),
            route(&[OLLAMA_8B, GROQ_8B, GEMINI_FLASH]),
        ),
        (
            TaskType::Creative.as_str().to_string(),
            route(&[GROQ_70B, GEMINI_FLASH, GEMINI_PRO, OPENROUTER_70B]),
        ),
        (
            TaskType::Analytical.as_str().to_string(),
            route(&[GEMINI_FLASH, GROQ_70B, GROQ_8B]),
        ),
        (
            TaskType::General.as_str().to_string(),
            route(&[OLLAMA_8B, GROQ_8B, GROQ_70B, GEMINI_FLASH]),
        ),
        (
            TaskType::PlagiarismCheck.as_str().to_string(),
            route(&[GEMINI_FLASH, GROQ_8B, OLLAMA_8B]),
        ),
        (
            TaskType::ChapterRewrite.as_str().to_string(),
            route(&[GROQ_70B, GEMINI_FLASH, GEMINI_PRO]),
        ),
        (
            TaskType::ChapterExtension.as_str().to_string(),
            route(&[GROQ_70B, GEMINI_FLASH, OLLAMA_8B]),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(models: &[&ModelSpec]) -> Vec<String> {
        models.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn provider_from_cli_name() {
        assert_eq!(Provider::from_cli_name("groq").unwrap(), Provider::Groq);
        assert_eq!(Provider::from_cli_name("GEMINI").unwrap(), Provider::Gemini);
        assert!(Provider::from_cli_name("invalid").is_err());
    }

    #[test]
    fn builtin_routes_reference_known_models() {
        let registry = ProviderRegistry::new(builtin_models(), builtin_routes());
        assert!(registry.is_ok());
    }

    #[test]
    fn fast_prefers_local_model() {
        let registry = ProviderRegistry::builtin();
        let candidates = registry.candidates(&TaskType::Fast);
        assert_eq!(candidates[0].id, OLLAMA_8B);
        assert_eq!(candidates[1].id, GROQ_8B);
        assert_eq!(candidates[2].id, GEMINI_FLASH);
        // fallback tail still covers every model once
        assert_eq!(candidates.len(), registry.models().len());
    }

    #[test]
    fn plagiarism_check_prefers_schema_capable_model() {
        let registry = ProviderRegistry::builtin();
        let candidates = registry.candidates(&TaskType::PlagiarismCheck);
        assert_eq!(candidates[0].id, GEMINI_FLASH);
    }

    #[test]
    fn unknown_task_uses_default_order() {
        let registry = ProviderRegistry::builtin();
        let candidates = registry.candidates(&TaskType::Other("outline".to_string()));
        let all: Vec<String> = registry.models().iter().map(|m| m.id.clone()).collect();
        assert_eq!(ids(&candidates), all);
    }

    #[test]
    fn task_without_route_uses_affinity_then_fallback() {
        let mut routes = builtin_routes();
        routes.remove("chapter_rewrite");
        let registry = ProviderRegistry::new(builtin_models(), routes).unwrap();
        let candidates = registry.candidates(&TaskType::ChapterRewrite);
        assert_eq!(candidates[0].id, GROQ_70B);
        assert_eq!(candidates[1].id, GEMINI_PRO);
        assert_eq!(candidates[2].id, OLLAMA_8B);
    }

    #[test]
    fn disabled_providers_are_skipped() {
        let registry = ProviderRegistry::builtin().with_disabled([Provider::Ollama]);
        let candidates = registry.candidates(&TaskType::Fast);
        assert!(candidates.iter().all(|m| m.provider != Provider::Ollama));
        assert_eq!(candidates[0].id, GROQ_8B);
    }

    #[test]
    fn general_fallback_can_be_disabled() {
        let registry = ProviderRegistry::builtin().with_general_fallback(false);
        assert_eq!(ids(&registry.candidates(&TaskType::Fast)), vec![
            OLLAMA_8B.to_string(),
            GROQ_8B.to_string(),
            GEMINI_FLASH.to_string()
        ]);
        let other = registry.candidates(&TaskType::Other("outline".to_string()));
        assert_eq!(other.len(), registry.models().len());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut models = builtin_models();
        models.push(models[0].clone());
        let err = ProviderRegistry::new(models, HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn routes_with_unknown_models_rejected() {
        let routes = HashMap::from([("fast".to_string(), vec!["nope/x".to_string()])]);
        let err = ProviderRegistry::new(builtin_models(), routes).unwrap_err();
        assert!(err.to_string().contains("nope/x"));
    }
}
