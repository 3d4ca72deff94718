//! Single provider call contract and outcome classification

use async_trait::async_trait;
use std::fmt;

use crate::core::models::{AttemptOutcome, Credential, Prompt};

/// What went wrong on one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// HTTP status, `None` for transport or decode failures
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    /// Whether rotating to another key or model cannot help
    pub fn is_permanent(&self) -> bool {
        match self.status {
            Some(400) => !mentions_api_key(&self.message),
            Some(413) | Some(422) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} - {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Some providers answer an invalid key with 400 instead of 401.
fn mentions_api_key(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("api key") || lower.contains("api_key")
}

/// Three-way result of one provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// Generated text, verbatim
    Success(String),
    /// Transient, worth another key or model
    Retryable(ProviderFailure),
    /// Malformed request, abort rotation
    Fatal(ProviderFailure),
}

impl InvokeOutcome {
    pub fn label(&self) -> AttemptOutcome {
        match self {
            InvokeOutcome::Success(_) => AttemptOutcome::Success,
            InvokeOutcome::Retryable(_) => AttemptOutcome::Retryable,
            InvokeOutcome::Fatal(_) => AttemptOutcome::Fatal,
        }
    }
}

impl From<ProviderFailure> for InvokeOutcome {
    fn from(failure: ProviderFailure) -> Self {
        if failure.is_permanent() {
            InvokeOutcome::Fatal(failure)
        } else {
            InvokeOutcome::Retryable(failure)
        }
    }
}

impl From<std::result::Result<String, ProviderFailure>> for InvokeOutcome {
    fn from(result: std::result::Result<String, ProviderFailure>) -> Self {
        match result {
            Ok(text) => InvokeOutcome::Success(text),
            Err(failure) => failure.into(),
        }
    }
}

/// An LLM backend reachable over the network
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// One generation call with one credential
    async fn invoke(&self, model: &str, credential: &Credential, prompt: &Prompt)
        -> InvokeOutcome;
}
