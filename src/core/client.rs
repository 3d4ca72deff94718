//! Shared HTTP client for provider calls

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::Result;
use crate::core::invoker::ProviderFailure;

/// Thin wrapper over `reqwest::Client` that turns responses into JSON or a [`ProviderFailure`]
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
}

impl ProviderClient {
    /// Create a client with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { client })
    }

    /// POST a JSON body and decode the JSON reply
    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> std::result::Result<Value, ProviderFailure> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderFailure::transport("Request timeout")
            } else {
                ProviderFailure::transport(format!("Network error: {}", e))
            }
        })?;

        let status = response.status();
        debug!("Provider responded with {}", status);

        if status.is_success() {
            response
                .json::<Value>()
                .await
                .map_err(|e| ProviderFailure::transport(format!("Invalid response: {}", e)))
        } else {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            Err(ProviderFailure::new(
                Some(status_code),
                error_message(&error_text),
            ))
        }
    }
}

/// Pull `error.message` out of a provider error body, or return the body itself
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["message"].as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.trim().to_string())
}
