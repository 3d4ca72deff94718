//! In-memory provider for pipeline tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::invoker::{InvokeOutcome, Provider, ProviderFailure};
use crate::core::models::{Credential, Prompt};

type Responder = Box<dyn Fn(&str, &str, &Prompt) -> Option<InvokeOutcome> + Send + Sync>;

/// One recorded call
#[derive(Debug, Clone)]
pub struct Call {
    pub model: String,
    pub key: String,
    pub prompt: Prompt,
}

/// Provider answering from per-(model, key) rules, falling back to a default outcome
pub struct ScriptedProvider {
    rules: HashMap<(String, String), InvokeOutcome>,
    responder: Option<Responder>,
    default: InvokeOutcome,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new(default: InvokeOutcome) -> Self {
        Self {
            rules: HashMap::new(),
            responder: None,
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding(text: &str) -> Self {
        Self::new(InvokeOutcome::Success(text.to_string()))
    }

    pub fn failing(status: u16) -> Self {
        Self::new(ProviderFailure::new(Some(status), "scripted failure").into())
    }

    pub fn on(mut self, model: &str, key: &str, outcome: InvokeOutcome) -> Self {
        self.rules
            .insert((model.to_string(), key.to_string()), outcome);
        self
    }

    /// Compute the outcome from the call itself; `None` falls through to the rules
    pub fn respond_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str, &Prompt) -> Option<InvokeOutcome> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .map(|c| (c.model, c.key))
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, model: &str, credential: &Credential, prompt: &Prompt) -> InvokeOutcome {
        let key = credential.expose();
        self.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            key: key.to_string(),
            prompt: prompt.clone(),
        });

        if let Some(outcome) = self
            .responder
            .as_ref()
            .and_then(|respond| respond(model, key, prompt))
        {
            return outcome;
        }

        self.rules
            .get(&(model.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

pub fn retryable(status: u16) -> InvokeOutcome {
    InvokeOutcome::Retryable(ProviderFailure::new(Some(status), "scripted failure"))
}

pub fn fatal() -> InvokeOutcome {
    InvokeOutcome::Fatal(ProviderFailure::new(Some(400), "malformed request"))
}
