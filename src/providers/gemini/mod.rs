//! Google Gemini adapter (`generateContent` API).
//!
//! Authenticated with the `x-goog-api-key` header. Structured output uses
//! `responseMimeType` plus `responseSchema`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    AdapterOutcome, Endpoint, GenerationAdapter, GenerationCall, ModelSpec, Provider, malformed,
    send_for_body,
};
use crate::core::registry::AuthMechanism;

#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    endpoint: Endpoint,
    client: Client,
}

impl GeminiAdapter {
    #[must_use]
    pub const fn new(endpoint: Endpoint, client: Client) -> Self {
        Self { endpoint, client }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

fn request_body<'a>(model: &ModelSpec, call: &GenerationCall<'a>) -> GenerateRequest<'a> {
    let schema = call.schema().filter(|_| model.supports_schema);
    GenerateRequest {
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: call.prompt }],
        }],
        system_instruction: call.system.map(|text| Content {
            role: None,
            parts: vec![Part { text }],
        }),
        generation_config: GenerationConfig {
            temperature: call.temperature,
            max_output_tokens: call.max_tokens,
            response_mime_type: call.schema().map(|_| "application/json"),
            response_schema: schema,
        },
    }
}

fn extract_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl GenerationAdapter for GeminiAdapter {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, model: &ModelSpec, call: &GenerationCall<'_>) -> AdapterOutcome {
        let Some(api_key) = self.endpoint.api_key.as_deref() else {
            return self.endpoint.missing_key(Provider::Gemini);
        };
        let AuthMechanism::ApiKeyHeader(header) = Provider::Gemini.auth() else {
            return AdapterOutcome::FatalError("unexpected Gemini auth mechanism".to_string());
        };

        let url = self
            .endpoint
            .url(&format!("models/{}:generateContent", model.name));
        let request = self
            .client
            .post(url)
            .header(header, api_key)
            .timeout(call.timeout())
            .json(&request_body(model, call));

        let body = match send_for_body(Provider::Gemini, request).await {
            Ok(body) => body,
            Err(outcome) => return outcome,
        };

        match serde_json::from_str::<GenerateResponse>(&body) {
            Ok(parsed) => AdapterOutcome::Success(extract_text(parsed)),
            Err(e) => malformed(Provider::Gemini, &e),
        }
    }
}
