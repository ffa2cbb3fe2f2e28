//! Provider health checks for the doctor command.
//!
//! Each provider gets a credential check and a reachability probe against a
//! cheap read-only endpoint (the model list). Probes never generate text, so
//! they cost no quota.

use std::time::Instant;

use reqwest::Client;
use tracing::debug;

use super::{CheckStatus, DiagnosticCheck, ProviderHealth};
use crate::core::registry::{AuthMechanism, Provider};
use crate::providers::Endpoint;

/// Check that an API key is available for `provider`.
#[must_use]
pub fn check_credentials(provider: Provider, endpoint: &Endpoint) -> DiagnosticCheck {
    let start = Instant::now();
    let name = format!("{} credentials", provider.display_name());

    let status = if matches!(provider.auth(), AuthMechanism::None) {
        match which::which("ollama") {
            Ok(path) => CheckStatus::Pass {
                details: Some(format!("no key needed; ollama at {}", path.display())),
            },
            Err(_) => CheckStatus::Pass {
                details: Some("no key needed".to_string()),
            },
        }
    } else if endpoint.api_key.is_some() {
        CheckStatus::Pass {
            details: endpoint
                .api_key_env
                .as_ref()
                .map(|env| format!("key found ({env} or keyring)")),
        }
    } else {
        let env = endpoint
            .api_key_env
            .clone()
            .or_else(|| provider.default_api_key_env().map(str::to_string))
            .unwrap_or_default();
        CheckStatus::Fail {
            reason: "no API key found".to_string(),
            suggestion: Some(format!(
                "export {env}=... or store it in the keyring (service 'folio', user '{}-api-key')",
                provider.cli_name()
            )),
        }
    };

    DiagnosticCheck::new(name, status).with_duration(start.elapsed())
}

/// Path probed to check reachability.
#[must_use]
pub const fn probe_path(provider: Provider) -> &'static str {
    match provider {
        Provider::Ollama => "api/tags",
        Provider::Groq | Provider::Gemini | Provider::OpenRouter => "models",
    }
}

/// Probe the provider's model list endpoint.
pub async fn check_reachable(
    provider: Provider,
    endpoint: &Endpoint,
    client: &Client,
) -> DiagnosticCheck {
    let start = Instant::now();
    let name = format!("{} reachable", provider.display_name());
    let url = endpoint.url(probe_path(provider));

    let mut request = client.get(&url).timeout(provider.probe_timeout());
    if let Some(key) = &endpoint.api_key {
        request = match provider.auth() {
            AuthMechanism::None => request,
            AuthMechanism::Bearer => request.bearer_auth(key),
            AuthMechanism::ApiKeyHeader(header) => request.header(header, key),
        };
    }

    let status = match request.send().await {
        Ok(response) if response.status().is_success() => CheckStatus::Pass {
            details: Some(format!("HTTP {}", response.status().as_u16())),
        },
        Ok(response) if matches!(response.status().as_u16(), 401 | 403) => CheckStatus::Fail {
            reason: format!("HTTP {} (key rejected)", response.status().as_u16()),
            suggestion: Some("check the API key".to_string()),
        },
        Ok(response) if response.status().as_u16() == 429 => CheckStatus::Warning {
            details: "reachable but rate limited".to_string(),
            suggestion: None,
        },
        Ok(response) => CheckStatus::Fail {
            reason: format!("HTTP {}", response.status().as_u16()),
            suggestion: None,
        },
        Err(e) if e.is_timeout() => CheckStatus::Timeout {
            after: provider.probe_timeout(),
        },
        Err(e) => CheckStatus::Fail {
            reason: format!("request failed: {e}"),
            suggestion: provider
                .is_local()
                .then(|| "start the daemon with `ollama serve`".to_string()),
        },
    };

    debug!(provider = %provider, %url, status = status.label(), "Reachability probe");
    DiagnosticCheck::new(name, status).with_duration(start.elapsed())
}

/// Credentials then reachability for one provider. Providers without a key
/// are not probed.
pub async fn check_provider_health(
    provider: Provider,
    endpoint: &Endpoint,
    client: &Client,
) -> ProviderHealth {
    let credentials = check_credentials(provider, endpoint);
    let reachable = if credentials.status.is_ready() {
        check_reachable(provider, endpoint, client).await
    } else {
        DiagnosticCheck::new(
            format!("{} reachable", provider.display_name()),
            CheckStatus::Skipped {
                reason: "no credentials".to_string(),
            },
        )
    };

    ProviderHealth {
        provider,
        credentials,
        reachable,
    }
}

/// Health for a provider switched off in config.
#[must_use]
pub fn disabled_health(provider: Provider) -> ProviderHealth {
    let skipped = |what: &str| {
        DiagnosticCheck::new(
            format!("{} {what}", provider.display_name()),
            CheckStatus::Skipped {
                reason: "disabled in config".to_string(),
            },
        )
    };
    ProviderHealth {
        provider,
        credentials: skipped("credentials"),
        reachable: skipped("reachable"),
    }
}

/// Check every provider concurrently.
pub async fn check_all_providers(
    targets: &[(Provider, Endpoint)],
    client: &Client,
) -> Vec<ProviderHealth> {
    let futures: Vec<_> = targets
        .iter()
        .map(|(provider, endpoint)| check_provider_health(*provider, endpoint, client))
        .collect();

    futures::future::join_all(futures).await
}
