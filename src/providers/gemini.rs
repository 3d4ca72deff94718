//! Google Gemini `generateContent` invoker, used by the rotating stages

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::client::ProviderClient;
use crate::core::invoker::{InvokeOutcome, Provider, ProviderFailure};
use crate::core::models::{Credential, Prompt, Role};

/// Default Generative Language API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini invoker
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: ProviderClient,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: ProviderClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

/// Build a `generateContent` body. Gemini calls the assistant role `model`.
pub(crate) fn build_body(prompt: &Prompt) -> Value {
    let contents: Vec<Value> = prompt
        .turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": turn.content }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if let Some(system) = &prompt.system {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// Concatenate the text parts of the first candidate
pub(crate) fn extract_text(json: &Value) -> Result<String, ProviderFailure> {
    let candidate = json["candidates"].get(0);
    let parts = candidate
        .and_then(|c| c["content"]["parts"].as_array())
        .ok_or_else(|| {
            let reason = candidate
                .and_then(|c| c["finishReason"].as_str())
                .or_else(|| json["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidates");
            ProviderFailure::transport(format!("No text in response ({})", reason))
        })?;

    Ok(parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(&self, model: &str, credential: &Credential, prompt: &Prompt) -> InvokeOutcome {
        debug!("Calling Gemini model {} with key {}", model, credential);

        let body = build_body(prompt);
        let result = self
            .client
            .post_json(
                &self.endpoint(model),
                &[("x-goog-api-key", credential.expose())],
                &body,
            )
            .await
            .and_then(|json| extract_text(&json));

        result.into()
    }
}
