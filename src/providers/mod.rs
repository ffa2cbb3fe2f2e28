//! Provider adapters.
//!
//! Each provider has its own submodule implementing [`GenerationAdapter`]:
//! request shaping, response parsing and HTTP status classification. The
//! dispatcher only sees [`AdapterOutcome`], so adding a provider means adding
//! one adapter and nothing else.

pub mod gemini;
pub mod ollama;
pub mod openai_compat;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use crate::core::cooldown::MAX_COOLDOWN;
use crate::core::http::timeout_for;
use crate::core::models::{OutcomeKind, Request, ResponseFormat};
pub use crate::core::registry::{ModelSpec, Provider};

/// Longest provider error body kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Keyring service holding API keys.
pub const KEYRING_SERVICE: &str = "folio";

static BODY_RETRY_DELAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+(?:\.\d+)?)s""#).expect("valid retry-delay regex")
});

// =============================================================================
// Adapter Contract
// =============================================================================

/// Provider-neutral view of one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationCall<'a> {
    pub prompt: &'a str,
    pub system: Option<&'a str>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub format: &'a ResponseFormat,
}

impl<'a> GenerationCall<'a> {
    #[must_use]
    pub fn from_request(request: &'a Request) -> Self {
        Self {
            prompt: &request.prompt,
            system: request.system.as_deref(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            format: &request.format,
        }
    }

    /// Per-call timeout scaled to the requested output size.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        timeout_for(self.max_tokens)
    }

    /// JSON schema requested for the output, if any.
    #[must_use]
    pub const fn schema(&self) -> Option<&'a serde_json::Value> {
        match self.format {
            ResponseFormat::Json { schema } => Some(schema),
            ResponseFormat::Text => None,
        }
    }
}

/// How one adapter call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterOutcome {
    /// Raw generated text, not yet normalized.
    Success(String),
    /// The provider signalled a rate limit.
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    /// Worth retrying on the same model after a backoff.
    TransientError(String),
    /// This model cannot serve the request; retrying is pointless.
    FatalError(String),
}

impl AdapterOutcome {
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success(_) => OutcomeKind::Success,
            Self::RateLimited { .. } => OutcomeKind::RateLimited,
            Self::TransientError(_) => OutcomeKind::TransientError,
            Self::FatalError(_) => OutcomeKind::FatalError,
        }
    }
}

/// A backend able to generate text for its provider's models.
#[async_trait]
pub trait GenerationAdapter: Send + Sync + Debug {
    fn provider(&self) -> Provider;

    /// Run one generation call. Never panics and never returns an error
    /// value: every failure is classified into an [`AdapterOutcome`].
    async fn generate(&self, model: &ModelSpec, call: &GenerationCall<'_>) -> AdapterOutcome;
}

/// Adapters keyed by the provider they serve.
pub type AdapterMap = HashMap<Provider, Arc<dyn GenerationAdapter>>;

// =============================================================================
// Endpoints and Credentials
// =============================================================================

/// Where and how to reach one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub api_base: String,
    pub api_key: Option<String>,
    /// Environment variable the key was expected in, for error messages.
    pub api_key_env: Option<String>,
}

impl Endpoint {
    /// Provider defaults with the key resolved from env or keyring.
    #[must_use]
    pub fn resolve(provider: Provider) -> Self {
        let env = provider.default_api_key_env();
        Self {
            api_base: provider.default_api_base().to_string(),
            api_key: resolve_api_key(provider, env),
            api_key_env: env.map(str::to_string),
        }
    }

    /// Explicit base URL and key (tests, config overrides).
    #[must_use]
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
            api_key_env: None,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub(crate) fn missing_key(&self, provider: Provider) -> AdapterOutcome {
        let hint = self
            .api_key_env
            .as_deref()
            .or_else(|| provider.default_api_key_env())
            .unwrap_or("an API key");
        AdapterOutcome::FatalError(format!(
            "no API key for {}; set {hint} or store it in the keyring",
            provider.display_name()
        ))
    }
}

/// Resolve an API key from `env_var`, then the OS keyring.
#[must_use]
pub fn resolve_api_key(provider: Provider, env_var: Option<&str>) -> Option<String> {
    if let Some(value) = env_var
        .and_then(|var| std::env::var(var).ok())
        .filter(|v| !v.trim().is_empty())
    {
        return Some(value.trim().to_string());
    }

    let user = format!("{}-api-key", provider.cli_name());
    let entry = keyring::Entry::new(KEYRING_SERVICE, &user).ok()?;
    entry.get_password().ok().filter(|v| !v.trim().is_empty())
}

/// Build the adapter serving `provider`.
#[must_use]
pub fn adapter_for(provider: Provider, endpoint: Endpoint, client: Client) -> Arc<dyn GenerationAdapter> {
    match provider {
        Provider::Ollama => Arc::new(ollama::OllamaAdapter::new(endpoint, client)),
        Provider::Gemini => Arc::new(gemini::GeminiAdapter::new(endpoint, client)),
        Provider::Groq | Provider::OpenRouter => Arc::new(openai_compat::OpenAiCompatAdapter::new(
            provider, endpoint, client,
        )),
    }
}

// =============================================================================
// Shared HTTP Classification
// =============================================================================

/// Parse a `Retry-After` header (delta-seconds form), capped at
/// [`MAX_COOLDOWN`].
#[must_use]
pub fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    retry_hint(value.parse().ok()?)
}

fn retry_after_body(body: &str) -> Option<Duration> {
    retry_hint(BODY_RETRY_DELAY.captures(body)?[1].parse().ok()?)
}

fn retry_hint(secs: f64) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_COOLDOWN.as_secs_f64())).ok()
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push('…');
    out
}

/// Classify a non-success HTTP response.
///
/// 429 is a rate limit; 408, 425 and 5xx are transient; any other 4xx
/// (bad request, auth, unknown model) is fatal for the model.
#[must_use]
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> AdapterOutcome {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body));

    if status == StatusCode::TOO_MANY_REQUESTS {
        return AdapterOutcome::RateLimited {
            retry_after: retry_after_header(headers).or_else(|| retry_after_body(body)),
            message,
        };
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status.as_u16() == 425
    {
        return AdapterOutcome::TransientError(message);
    }
    AdapterOutcome::FatalError(message)
}

/// Classify a transport failure (timeout, connection, body read).
#[must_use]
pub fn classify_transport(err: &reqwest::Error) -> AdapterOutcome {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    AdapterOutcome::TransientError(format!("{kind}: {err}"))
}

/// Send a request and return the body of a successful response, or the
/// classified failure.
pub(crate) async fn send_for_body(
    provider: Provider,
    request: RequestBuilder,
) -> std::result::Result<String, AdapterOutcome> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport(&e))?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await.map_err(|e| classify_transport(&e))?;

    debug!(
        provider = %provider,
        status = status.as_u16(),
        body_len = body.len(),
        "Provider response"
    );

    if status.is_success() {
        Ok(body)
    } else {
        Err(classify_status(status, &headers, &body))
    }
}

/// Outcome for a 2xx body that does not match the expected shape.
pub(crate) fn malformed(provider: Provider, err: &serde_json::Error) -> AdapterOutcome {
    AdapterOutcome::TransientError(format!(
        "malformed {} response: {err}",
        provider.display_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with_retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn too_many_requests_is_rate_limited_with_retry_after() {
        let outcome = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers_with_retry_after("17"),
            "slow down",
        );
        assert_eq!(
            outcome,
            AdapterOutcome::RateLimited {
                retry_after: Some(Duration::from_secs(17)),
                message: "HTTP 429: slow down".to_string(),
            }
        );
    }

    #[test]
    fn retry_delay_read_from_body_when_header_missing() {
        let body = r#"{"error":{"details":[{"retryDelay": "38s"}]}}"#;
        let outcome = classify_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), body);
        assert!(matches!(
            outcome,
            AdapterOutcome::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(38)
        ));
    }

    #[test]
    fn absurd_retry_hints_are_capped() {
        assert_eq!(
            retry_after_header(&headers_with_retry_after("100000000000000")),
            Some(MAX_COOLDOWN)
        );
        let body = r#"{"retryDelay": "99999999999999999999999s"}"#;
        let outcome = classify_status(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), body);
        assert!(matches!(
            outcome,
            AdapterOutcome::RateLimited { retry_after: Some(d), .. } if d == MAX_COOLDOWN
        ));
        assert_eq!(retry_after_header(&headers_with_retry_after("-5")), None);
    }

    #[test]
    fn client_errors_are_fatal() {
        for code in [400, 401, 403, 404] {
            let status = StatusCode::from_u16(code).unwrap();
            let outcome = classify_status(status, &HeaderMap::new(), "");
            assert_eq!(outcome.kind(), OutcomeKind::FatalError, "status {code}");
        }
    }

    #[test]
    fn server_errors_and_timeouts_are_transient() {
        for code in [408, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            let outcome = classify_status(status, &HeaderMap::new(), "");
            assert_eq!(outcome.kind(), OutcomeKind::TransientError, "status {code}");
        }
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let AdapterOutcome::FatalError(message) =
            classify_status(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body)
        else {
            panic!("expected fatal");
        };
        assert!(message.chars().count() < 400);
    }

    #[test]
    fn endpoint_url_joins_cleanly() {
        let endpoint = Endpoint::new("http://localhost:1234/", None);
        assert_eq!(endpoint.url("/api/chat"), "http://localhost:1234/api/chat");
    }

    #[test]
    fn missing_key_names_env_var() {
        let endpoint = Endpoint::new("http://x", None);
        let AdapterOutcome::FatalError(message) = endpoint.missing_key(Provider::Groq) else {
            panic!("expected fatal");
        };
        assert!(message.contains("GROQ_API_KEY"));
    }
}
