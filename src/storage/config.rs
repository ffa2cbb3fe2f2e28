//! Configuration file loading and validation.
//!
//! Loads configuration from:
//! - Linux/macOS: `~/.config/folio/config.toml`
//! - Windows: `%APPDATA%/folio/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `FOLIO_CONFIG`: Override config file path
//! - `FOLIO_STATE_DB`: Override the state database path
//! - `FOLIO_COOLDOWN_SECS`: Override the rate-limit cooldown
//!
//! ## Models and routes
//!
//! `[[models]]` entries replace a built-in model with the same id and are
//! otherwise appended to the general fallback order. `[routes]` entries
//! replace the built-in route for that task name; new task names add routes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::core::convergence::LoopConfig;
use crate::core::models::{MAX_TEMPERATURE, TaskType};
use crate::core::registry::{
    CostClass, ModelSpec, Provider, ProviderRegistry, builtin_models, builtin_routes,
};
use crate::core::retry::RetryPolicy;
use crate::error::{FolioError, Result};
use crate::providers::{Endpoint, resolve_api_key};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "FOLIO_CONFIG";
/// Environment variable to override the state database path.
pub const ENV_STATE_DB: &str = "FOLIO_STATE_DB";
/// Environment variable to override the cooldown in seconds.
pub const ENV_COOLDOWN_SECS: &str = "FOLIO_COOLDOWN_SECS";

// =============================================================================
// File Model
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub dispatch: DispatchConfig,
    pub quality: QualityConfig,
    pub providers: ProvidersConfig,
    /// Extra or replacement model definitions.
    pub models: Vec<ModelEntry>,
    /// Task name → ordered model ids.
    pub routes: HashMap<String, Vec<String>>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries per candidate for transient failures.
    pub retry_budget: u32,
    /// First backoff delay; doubles on each retry.
    pub backoff_base_secs: u64,
    pub cooldown_secs: u64,
    /// Longest wait for a per-minute quota slot before moving on.
    pub max_quota_wait_secs: u64,
    pub quota_window_secs: u64,
    /// Try every remaining model after the preferred ones.
    pub general_fallback: bool,
    /// State database path; defaults to the platform data dir.
    pub state_db: Option<PathBuf>,
    pub attempt_retention_days: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_budget: crate::core::models::DEFAULT_RETRY_BUDGET,
            backoff_base_secs: 2,
            cooldown_secs: crate::core::cooldown::DEFAULT_COOLDOWN.as_secs(),
            max_quota_wait_secs: crate::core::dispatcher::DEFAULT_MAX_QUOTA_WAIT.as_secs(),
            quota_window_secs: crate::core::quota::DEFAULT_WINDOW.as_secs(),
            general_fallback: true,
            state_db: None,
            attempt_retention_days: super::schema::DEFAULT_ATTEMPT_RETENTION_DAYS,
        }
    }
}

/// Convergence loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_words: usize,
    pub max_attempts: u32,
    pub relaxed_threshold: u8,
    pub relaxed_after: u32,
    pub max_expansion_attempts: u32,
    pub base_temperature: f32,
    pub temperature_step: f32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let defaults = LoopConfig::default();
        Self {
            min_words: defaults.min_words,
            max_attempts: defaults.max_attempts,
            relaxed_threshold: defaults.relaxed_threshold,
            relaxed_after: defaults.relaxed_after,
            max_expansion_attempts: defaults.max_expansion_attempts,
            base_temperature: defaults.base_temperature,
            temperature_step: defaults.temperature_step,
        }
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub ollama: ProviderSettings,
    pub groq: ProviderSettings,
    pub gemini: ProviderSettings,
    pub openrouter: ProviderSettings,
}

/// Settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    /// Custom API base URL (if different from default).
    pub api_base: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: None,
            api_key_env: None,
        }
    }
}

/// A `[[models]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: String,
    pub name: String,
    pub per_minute_limit: u32,
    pub per_day_limit: u32,
    #[serde(default = "default_class")]
    pub class: CostClass,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Overrides the provider's schema support.
    #[serde(default)]
    pub supports_schema: Option<bool>,
}

const fn default_class() -> CostClass {
    CostClass::Standard
}

impl ModelEntry {
    fn to_spec(&self) -> Result<ModelSpec> {
        let provider =
            Provider::from_cli_name(&self.provider).map_err(|_| FolioError::ConfigInvalid {
                key: format!("models.{}", self.name),
                message: format!("unknown provider '{}'", self.provider),
            })?;
        let tags: Vec<TaskType> = self.tags.iter().map(|t| TaskType::parse(t)).collect();
        let mut spec = ModelSpec::new(
            provider,
            &self.name,
            self.per_minute_limit,
            self.per_day_limit,
            self.class,
            &tags,
        );
        if let Some(supports_schema) = self.supports_schema {
            spec.supports_schema = supports_schema;
        }
        Ok(spec)
    }
}

// =============================================================================
// Loading
// =============================================================================

impl Config {
    /// Load from `FOLIO_CONFIG` or the default path, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid, or an override or
    /// value is out of range.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from))
            .unwrap_or_else(Self::config_path);

        let config = Self::load_from(&path)?.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigParse`] if the file is not valid TOML for
    /// this schema.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Parse TOML text; `origin` only labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigParse`] on invalid input.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| FolioError::ConfigParse {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `FOLIO_STATE_DB` and `FOLIO_COOLDOWN_SECS`.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigInvalid`] if the cooldown is not a number.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(path) = env_value(ENV_STATE_DB) {
            self.dispatch.state_db = Some(PathBuf::from(path));
        }
        if let Some(secs) = env_value(ENV_COOLDOWN_SECS) {
            self.dispatch.cooldown_secs =
                secs.parse().map_err(|_| FolioError::ConfigInvalid {
                    key: ENV_COOLDOWN_SECS.to_string(),
                    message: format!("expected seconds, got '{secs}'"),
                })?;
        }
        Ok(self)
    }

    /// Default config file path.
    #[must_use]
    pub fn config_path() -> PathBuf {
        AppPaths::new().config_file()
    }

    /// Check ranges and model/route references.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigInvalid`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| FolioError::ConfigInvalid {
            key: key.to_string(),
            message: message.to_string(),
        };

        if self.dispatch.cooldown_secs == 0 {
            return Err(invalid("dispatch.cooldown_secs", "must be greater than 0"));
        }
        if self.dispatch.quota_window_secs == 0 {
            return Err(invalid("dispatch.quota_window_secs", "must be greater than 0"));
        }
        if self.dispatch.attempt_retention_days <= 0 {
            return Err(invalid(
                "dispatch.attempt_retention_days",
                "must be greater than 0",
            ));
        }
        if self.quality.max_attempts == 0 {
            return Err(invalid("quality.max_attempts", "must be greater than 0"));
        }
        if !(1..=10).contains(&self.quality.relaxed_threshold) {
            return Err(invalid("quality.relaxed_threshold", "must be between 1 and 10"));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.quality.base_temperature) {
            return Err(invalid(
                "quality.base_temperature",
                "must be between 0.0 and 2.0",
            ));
        }
        if self.quality.temperature_step < 0.0 {
            return Err(invalid("quality.temperature_step", "must not be negative"));
        }
        if let Some(level) = &self.general.log_level
            && crate::core::logging::LogLevel::from_arg(level).is_none()
        {
            return Err(invalid(
                "general.log_level",
                "expected one of trace, debug, info, warn, error",
            ));
        }

        // Unknown providers, zero limits, duplicate ids and dangling routes.
        self.build_registry().map(|_| ())
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    #[must_use]
    pub const fn provider_settings(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Ollama => &self.providers.ollama,
            Provider::Groq => &self.providers.groq,
            Provider::Gemini => &self.providers.gemini,
            Provider::OpenRouter => &self.providers.openrouter,
        }
    }

    /// Providers switched off in `[providers.<name>]`.
    #[must_use]
    pub fn disabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .iter()
            .copied()
            .filter(|p| !self.provider_settings(*p).enabled)
            .collect()
    }

    /// Built-in table merged with `[[models]]` and `[routes]`.
    ///
    /// # Errors
    ///
    /// Returns [`FolioError::ConfigInvalid`] for an inconsistent table.
    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let mut models = builtin_models();
        for entry in &self.models {
            let spec = entry.to_spec()?;
            match models.iter_mut().find(|m| m.id == spec.id) {
                Some(existing) => *existing = spec,
                None => models.push(spec),
            }
        }

        let mut routes = builtin_routes();
        routes.extend(self.routes.clone());

        Ok(ProviderRegistry::new(models, routes)?
            .with_disabled(self.disabled_providers())
            .with_general_fallback(self.dispatch.general_fallback))
    }

    /// Endpoint for `provider` with overrides applied and the key resolved.
    #[must_use]
    pub fn endpoint(&self, provider: Provider) -> Endpoint {
        let settings = self.provider_settings(provider);
        let api_key_env = settings
            .api_key_env
            .clone()
            .or_else(|| provider.default_api_key_env().map(str::to_string));
        let api_key = if provider.is_local() {
            None
        } else {
            resolve_api_key(provider, api_key_env.as_deref())
        };

        Endpoint {
            api_base: settings
                .api_base
                .clone()
                .unwrap_or_else(|| provider.default_api_base().to_string()),
            api_key,
            api_key_env,
        }
    }

    #[must_use]
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            min_words: self.quality.min_words,
            max_attempts: self.quality.max_attempts,
            relaxed_threshold: self.quality.relaxed_threshold,
            relaxed_after: self.quality.relaxed_after,
            max_expansion_attempts: self.quality.max_expansion_attempts,
            base_temperature: self.quality.base_temperature,
            temperature_step: self.quality.temperature_step,
            ..LoopConfig::default()
        }
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(self.dispatch.backoff_base_secs), 2)
    }

    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.dispatch.cooldown_secs)
    }

    #[must_use]
    pub const fn quota_window(&self) -> Duration {
        Duration::from_secs(self.dispatch.quota_window_secs)
    }

    #[must_use]
    pub const fn max_quota_wait(&self) -> Duration {
        Duration::from_secs(self.dispatch.max_quota_wait_secs)
    }

    /// Configured state database path, else the platform default.
    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        self.dispatch
            .state_db
            .clone()
            .unwrap_or_else(|| AppPaths::new().state_db_file())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
