//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::core::retrier::RetryPolicy;
use crate::core::translator::ChunkSettings;

/// Default config file name, looked up with any extension the `config` crate supports
pub const DEFAULT_CONFIG_NAME: &str = "relay";
/// Prefix of environment overrides, e.g. `RELAY_RETRY_DELAY_MS`
pub const ENV_PREFIX: &str = "RELAY";
/// Read when no primary key is configured through the layers above
pub const PRIMARY_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Fallback models, in order of preference
const DEFAULT_FALLBACK_MODELS: &[&str] = &[
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "gemini-1.5-pro",
    "gemini-1.5-flash",
    "gemini-1.5-flash-8b",
];

const DEFAULT_SYSTEM_PROMPT: &str = "You are a highly knowledgeable, detailed AI assistant. \
Provide comprehensive, thorough responses with examples, explanations, and practical insights. \
Break down complex topics clearly. Be informative and educational.";

/// Configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub primary_api_key: Option<String>,
    pub primary_model: String,
    pub primary_endpoint: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub fallback_endpoint: String,
    pub fallback_models: Vec<String>,
    pub enhance_keys_file: PathBuf,
    pub translate_keys_file: PathBuf,
    pub enhance_model: String,
    pub translate_model: String,
    pub target_language: String,
    pub max_chunk_chars: usize,
    pub retry_delay_ms: u64,
    pub chunk_delay_ms: u64,
    pub max_key_attempts: usize,
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            primary_api_key: None,
            primary_model: "claude-sonnet-4-5-20250929".to_string(),
            primary_endpoint: crate::providers::anthropic::DEFAULT_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: 1.0,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fallback_endpoint: crate::providers::gemini::DEFAULT_BASE_URL.to_string(),
            fallback_models: DEFAULT_FALLBACK_MODELS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            enhance_keys_file: PathBuf::from("keys.txt"),
            translate_keys_file: PathBuf::from("translate_keys.txt"),
            enhance_model: "gemini-2.5-pro".to_string(),
            translate_model: "gemini-2.5-flash".to_string(),
            target_language: "Spanish".to_string(),
            max_chunk_chars: 2000,
            retry_delay_ms: 2000,
            chunk_delay_ms: 1000,
            max_key_attempts: 10,
            timeout_ms: 60000,
        }
    }
}

impl RelayConfig {
    /// Load defaults, then the config file (`path`, or `relay.*` from the working directory),
    /// then `RELAY_*` variables, then `ANTHROPIC_API_KEY` if no primary key was set
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("fallback_models"),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize()?;

        if config.primary_api_key.is_none() {
            config.primary_api_key = std::env::var(PRIMARY_KEY_VAR)
                .ok()
                .filter(|k| !k.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.fallback_models.is_empty() {
            return Err(anyhow::anyhow!("At least one fallback model is required"));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.fallback_models.iter().find(|m| !seen.insert(m.as_str())) {
            return Err(anyhow::anyhow!("Duplicate fallback model: {}", dup));
        }

        if self.max_key_attempts == 0 {
            return Err(anyhow::anyhow!("max_key_attempts must be greater than 0"));
        }

        if self.max_chunk_chars == 0 {
            return Err(anyhow::anyhow!("max_chunk_chars must be greater than 0"));
        }

        if self.timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeout_ms must be greater than 0"));
        }

        if self.primary_api_key.is_none() {
            warn!(
                "Primary API key not found, chat requests will fail until {} is set",
                PRIMARY_KEY_VAR
            );
        }

        for model in [&self.enhance_model, &self.translate_model] {
            if !self.fallback_models.contains(model) {
                warn!("Model {} is not in the fallback list, rotation starts at the top", model);
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_key_attempts: self.max_key_attempts,
            attempt_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn chunk_settings(&self) -> ChunkSettings {
        ChunkSettings {
            max_chunk_chars: self.max_chunk_chars,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            target_language: self.target_language.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Holds the env lock, sets or clears variables, and restores them on drop
    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn set(vars: &[(&'static str, Option<&str>)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|(name, value)| {
                    let old = std::env::var(name).ok();
                    match value {
                        Some(value) => std::env::set_var(name, value),
                        None => std::env::remove_var(name),
                    }
                    (*name, old)
                })
                .collect();
            Self { saved, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, old) in &self.saved {
                match old {
                    Some(value) => std::env::set_var(name, value),
                    None => std::env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: [&str; 4] = [
        "RELAY_FALLBACK_MODELS",
        "RELAY_RETRY_DELAY_MS",
        "RELAY_PRIMARY_API_KEY",
        PRIMARY_KEY_VAR,
    ];

    fn clean_env() -> EnvGuard {
        EnvGuard::set(&ENV_VARS.map(|name| (name, None)))
    }

    #[test]
    fn test_config_validation() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let cases = [
            RelayConfig {
                fallback_models: vec![],
                ..Default::default()
            },
            RelayConfig {
                fallback_models: vec!["a".to_string(), "b".to_string(), "a".to_string()],
                ..Default::default()
            },
            RelayConfig {
                max_key_attempts: 0,
                ..Default::default()
            },
            RelayConfig {
                max_chunk_chars: 0,
                ..Default::default()
            },
            RelayConfig {
                timeout_ms: 0,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn test_derived_settings() {
        let config = RelayConfig {
            retry_delay_ms: 250,
            max_key_attempts: 3,
            chunk_delay_ms: 10,
            target_language: "German".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_key_attempts: 3,
                attempt_delay: Duration::from_millis(250),
            }
        );
        let chunks = config.chunk_settings();
        assert_eq!(chunks.max_chunk_chars, 2000);
        assert_eq!(chunks.chunk_delay, Duration::from_millis(10));
        assert_eq!(chunks.target_language, "German");
    }

    #[test]
    fn test_load_from_toml_file() {
        let _env = clean_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
primary_api_key = "from-file"
fallback_models = ["m-a", "m-b"]
enhance_model = "m-a"
translate_model = "m-b"
max_chunk_chars = 500
"#
        )
        .unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.primary_api_key.as_deref(), Some("from-file"));
        assert_eq!(config.fallback_models, vec!["m-a", "m-b"]);
        assert_eq!(config.max_chunk_chars, 500);
        assert_eq!(config.retry_delay_ms, 2000);
    }

    #[test]
    fn test_env_overrides_file_and_fills_primary_key() {
        let _env = EnvGuard::set(&[
            ("RELAY_FALLBACK_MODELS", Some("x-1,x-2")),
            ("RELAY_RETRY_DELAY_MS", Some("5")),
            ("RELAY_PRIMARY_API_KEY", None),
            (PRIMARY_KEY_VAR, Some("sk-from-env")),
        ]);
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
fallback_models = ["m-a", "m-b"]
retry_delay_ms = 900
enhance_model = "x-1"
translate_model = "x-2"
"#
        )
        .unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.fallback_models, vec!["x-1", "x-2"]);
        assert_eq!(config.retry_delay_ms, 5);
        assert_eq!(config.retry_policy().attempt_delay, Duration::from_millis(5));
        assert_eq!(config.primary_api_key.as_deref(), Some("sk-from-env"));
    }

    #[test]
    fn test_blank_primary_key_var_is_ignored() {
        let _env = EnvGuard::set(&[
            ("RELAY_FALLBACK_MODELS", None),
            ("RELAY_RETRY_DELAY_MS", None),
            ("RELAY_PRIMARY_API_KEY", None),
            (PRIMARY_KEY_VAR, Some("   ")),
        ]);
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();

        let config = RelayConfig::load(Some(file.path())).unwrap();
        assert!(config.primary_api_key.is_none());
        assert_eq!(config.fallback_models.len(), DEFAULT_FALLBACK_MODELS.len());
    }

    #[test]
    fn test_json_file_uses_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"target_language": "Japanese"}}"#).unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.target_language, "Japanese");
        assert_eq!(config.fallback_models.len(), DEFAULT_FALLBACK_MODELS.len());
    }
}
