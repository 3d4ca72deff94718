//! Core data models for the relay pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque provider secret
///
/// `Debug` and `Display` only show a short fingerprint so credentials never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Raw secret, for building request headers only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Last four characters of the secret, nothing for secrets that short
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 4 {
            return "…".to_string();
        }
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("…{}", tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of the caller-owned conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What an invoker sends to a provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub turns: Vec<Turn>,
}

impl Prompt {
    /// Single user message without system instruction
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            system: None,
            turns: vec![Turn::user(content)],
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Content of the final turn, empty when there are no turns
    pub fn last_content(&self) -> &str {
        self.turns.last().map(|t| t.content.as_str()).unwrap_or("")
    }
}

/// Model name and its rank in the fallback chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    pub rank: usize,
}

/// Priority-ordered models shared by every rotating stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    models: Vec<ModelDescriptor>,
}

impl FallbackChain {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models = names
            .into_iter()
            .enumerate()
            .map(|(rank, name)| ModelDescriptor {
                name: name.into(),
                rank,
            })
            .collect();
        Self { models }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Every model once, starting at `preferred` and wrapping around.
    /// An unknown preferred model starts at rank 0.
    pub fn attempt_order(&self, preferred: &str) -> Vec<&ModelDescriptor> {
        let start = self
            .models
            .iter()
            .position(|m| m.name == preferred)
            .unwrap_or(0);
        let len = self.models.len();
        (0..len).map(|i| &self.models[(start + i) % len]).collect()
    }
}

/// Outcome label of one rotation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Fatal,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Retryable => write!(f, "retryable"),
            AttemptOutcome::Fatal => write!(f, "fatal"),
        }
    }
}

/// Ephemeral record of one (model, key) attempt, only logged
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub model: String,
    pub key: String,
    pub attempt: usize,
    pub outcome: AttemptOutcome,
}

/// How a pipeline stage ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Skipped,
    /// Stage failed and the previous text was kept
    Degraded { reason: String },
    /// Translation where some chunks kept their original text
    Partial { translated: usize, total: usize },
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Degraded { reason } => write!(f, "degraded ({})", reason),
            StageStatus::Partial { translated, total } => {
                write!(f, "partial ({}/{} chunks)", translated, total)
            }
        }
    }
}

/// Per-request status of each stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub enhance: StageStatus,
    pub generate: StageStatus,
    pub translate: StageStatus,
}

/// Final pipeline output
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub response: String,
    pub stages: StageReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_order_rotates_from_preferred() {
        let chain = FallbackChain::new(["a", "b", "c"]);
        let order: Vec<&str> = chain
            .attempt_order("b")
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_attempt_order_unknown_preferred_starts_at_top() {
        let chain = FallbackChain::new(["a", "b"]);
        let order: Vec<usize> = chain.attempt_order("zzz").iter().map(|m| m.rank).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_credential_never_prints_secret() {
        let key = Credential::new("sk-very-secret-1234");
        assert_eq!(format!("{:?}", key), "Credential(…1234)");
        assert!(!key.to_string().contains("secret"));
        assert_eq!(Credential::new("ab").fingerprint(), "…");
        assert_eq!(Credential::new("abcd").fingerprint(), "…");
        assert_eq!(Credential::new("abcde").fingerprint(), "…bcde");
    }

    #[test]
    fn test_role_serde() {
        let turn: Turn = serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(turn, Turn::assistant("hi"));
        assert!(serde_json::from_str::<Turn>(r#"{"role":"system","content":"x"}"#).is_err());
    }
}
