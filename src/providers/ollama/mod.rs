//! Ollama adapter for the local inference daemon (`/api/chat`).
//!
//! Unauthenticated. Structured output passes the JSON schema as `format`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    AdapterOutcome, Endpoint, GenerationAdapter, GenerationCall, ModelSpec, Provider, malformed,
    send_for_body,
};

#[derive(Debug, Clone)]
pub struct OllamaAdapter {
    endpoint: Endpoint,
    client: Client,
}

impl OllamaAdapter {
    #[must_use]
    pub const fn new(endpoint: Endpoint, client: Client) -> Self {
        Self { endpoint, client }
    }

    /// URL of the daemon's model list, used for reachability probes.
    #[must_use]
    pub fn tags_url(&self) -> String {
        self.endpoint.url("api/tags")
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    options: Options,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
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

    ChatRequest {
        model: &model.name,
        messages,
        stream: false,
        options: Options {
            temperature: call.temperature,
            num_predict: call.max_tokens,
        },
        format: call.schema(),
    }
}

#[async_trait]
impl GenerationAdapter for OllamaAdapter {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn generate(&self, model: &ModelSpec, call: &GenerationCall<'_>) -> AdapterOutcome {
        let request = self
            .client
            .post(self.endpoint.url("api/chat"))
            .timeout(call.timeout())
            .json(&request_body(model, call));

        let body = match send_for_body(Provider::Ollama, request).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        match serde_json::from_str::<ChatResponse>(&body) {
            Ok(parsed) => AdapterOutcome::Success(
                parsed.message.map(|m| m.content).unwrap_or_default(),
            ),
            Err(e) => malformed(Provider::Ollama, &e),
        }
    }
}
