//! Anthropic Messages invoker, used for primary generation

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::client::ProviderClient;
use crate::core::invoker::{InvokeOutcome, Provider, ProviderFailure};
use crate::core::models::{Credential, Prompt};

/// Default Anthropic API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages invoker
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: ProviderClient,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(client: ProviderClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            max_tokens: 4096,
            temperature: 1.0,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/messages", base)
        } else {
            format!("{}/v1/messages", base)
        }
    }

    pub(crate) fn build_body(&self, model: &str, prompt: &Prompt) -> Value {
        let messages: Vec<Value> = prompt
            .turns
            .iter()
            .map(|turn| json!({ "role": turn.role.to_string(), "content": turn.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": messages,
        });
        if let Some(system) = &prompt.system {
            body["system"] = json!(system);
        }
        body
    }
}

/// Concatenate every `text` content block
pub(crate) fn extract_text(json: &Value) -> Result<String, ProviderFailure> {
    let blocks = json["content"]
        .as_array()
        .ok_or_else(|| ProviderFailure::transport("No content in response"))?;

    Ok(blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect::<Vec<_>>()
        .concat())
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn invoke(&self, model: &str, credential: &Credential, prompt: &Prompt) -> InvokeOutcome {
        debug!("Calling Anthropic model {} with key {}", model, credential);

        let body = self.build_body(model, prompt);
        let result = self
            .client
            .post_json(
                &self.endpoint(),
                &[
                    ("x-api-key", credential.expose()),
                    ("anthropic-version", API_VERSION),
                ],
                &body,
            )
            .await
            .and_then(|json| extract_text(&json));

        result.into()
    }
}
