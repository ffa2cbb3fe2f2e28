//! Provider wire fixtures and dispatcher builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use folio::core::clock::Clock;
use folio::core::dispatcher::Dispatcher;
use folio::core::http::default_client;
use folio::core::models::TaskType;
use folio::core::registry::{CostClass, ModelSpec, Provider, ProviderRegistry};
use folio::providers::{AdapterMap, Endpoint, adapter_for};
use folio::storage::state_store::StateStore;

pub const TEST_KEY: &str = "test-key";

/// Gemini `generateContent` success body.
#[must_use]
pub fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 40 }
    })
}

/// Gemini quota error with the delay in the body instead of a header.
#[must_use]
pub fn gemini_quota_body(delay_secs: u32) -> Value {
    json!({
        "error": {
            "code": 429,
            "status": "RESOURCE_EXHAUSTED",
            "details": [{
                "@type": "type.googleapis.com/google.rpc.RetryInfo",
                "retryDelay": format!("{delay_secs}s")
            }]
        }
    })
}

/// OpenAI-compatible chat completion body (Groq, `OpenRouter`).
#[must_use]
pub fn chat_body(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    })
}

/// Ollama `/api/chat` non-streaming body.
#[must_use]
pub fn ollama_body(text: &str) -> Value {
    json!({
        "model": "llama3.1:8b",
        "message": { "role": "assistant", "content": text },
        "done": true
    })
}

/// Endpoint pointing at a mock server.
#[must_use]
pub fn mock_endpoint(base: &str, provider: Provider) -> Endpoint {
    let key = (!provider.is_local()).then(|| TEST_KEY.to_string());
    Endpoint::new(base, key)
}

/// One model per provider, routed `fast` in the given order.
#[must_use]
pub fn registry_in_order(order: &[(Provider, &str)]) -> ProviderRegistry {
    let models: Vec<ModelSpec> = order
        .iter()
        .map(|(provider, name)| {
            ModelSpec::new(*provider, name, 100, 1_000, CostClass::Standard, &[TaskType::Fast])
        })
        .collect();
    let route = models.iter().map(|m| m.id.clone()).collect();
    ProviderRegistry::new(models, HashMap::from([("fast".to_string(), route)]))
        .expect("consistent test registry")
        .with_general_fallback(false)
}

/// Dispatcher whose adapters all talk to `base`.
#[must_use]
pub fn dispatcher_against(
    base: &str,
    registry: ProviderRegistry,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
) -> Dispatcher {
    let client = default_client().expect("http client");
    let mut adapters: AdapterMap = HashMap::new();
    for &provider in Provider::ALL {
        adapters.insert(
            provider,
            adapter_for(provider, mock_endpoint(base, provider), client.clone()),
        );
    }
    Dispatcher::new(Arc::new(registry), adapters, store, clock)
}
