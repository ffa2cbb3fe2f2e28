//! OpenAI-compatible chat completions adapter (Groq, OpenRouter).
//!
//! Bearer-token auth. Structured output uses `response_format`: a full
//! `json_schema` where the model supports it, plain JSON mode otherwise.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    AdapterOutcome, Endpoint, GenerationAdapter, GenerationCall, ModelSpec, Provider, malformed,
    send_for_body,
};

/// Title sent to OpenRouter for attribution.
const APP_TITLE: &str = "folio";

#[derive(Debug, Clone)]
pub struct OpenAiCompatAdapter {
    provider: Provider,
    endpoint: Endpoint,
    client: Client,
}

impl OpenAiCompatAdapter {
    #[must_use]
    pub const fn new(provider: Provider, endpoint: Endpoint, client: Client) -> Self {
        Self {
            provider,
            endpoint,
            client,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn request_body<'a>(model: &'a ModelSpec, call: &GenerationCall<'a>) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = call.system {
        messages.push(Message {
            role: "system",
            content: system,
        });
    }
    messages.push(Message {
        role: "user",
        content: call.prompt,
    });

    let response_format = call.schema().map(|schema| {
        if model.supports_schema {
            json!({
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": schema }
            })
        } else {
            json!({ "type": "json_object" })
        }
    });

    ChatRequest {
        model: &model.name,
        messages,
        temperature: call.temperature,
        max_tokens: call.max_tokens,
        response_format,
    }
}

#[async_trait]
impl GenerationAdapter for OpenAiCompatAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn generate(&self, model: &ModelSpec, call: &GenerationCall<'_>) -> AdapterOutcome {
        let Some(api_key) = self.endpoint.api_key.as_deref() else {
            return self.endpoint.missing_key(self.provider);
        };

        let mut request = self
            .client
            .post(self.endpoint.url("chat/completions"))
            .bearer_auth(api_key)
            .timeout(call.timeout())
            .json(&request_body(model, call));
        if self.provider == Provider::OpenRouter {
            request = request.header("X-Title", APP_TITLE);
        }

        let body = match send_for_body(self.provider, request).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        match serde_json::from_str::<ChatResponse>(&body) {
            Ok(parsed) => AdapterOutcome::Success(
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default(),
            ),
            Err(e) => malformed(self.provider, &e),
        }
    }
}
