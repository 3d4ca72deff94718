//! Enhance → generate → translate pipeline

use std::sync::Arc;
use tracing::{info, warn};

use crate::core::client::ProviderClient;
use crate::core::config::RelayConfig;
use crate::core::errors::{RelayError, Result};
use crate::core::invoker::{InvokeOutcome, Provider};
use crate::core::key_pool::{KeyPool, KeyRing, ENHANCE_POOL, TRANSLATE_POOL};
use crate::core::models::{
    Credential, FallbackChain, Prompt, Role, StageReport, StageStatus, Turn, WorkflowOutcome,
};
use crate::core::retrier::RotationRetrier;
use crate::core::translator::ChunkTranslator;
use crate::providers::{AnthropicProvider, GeminiProvider};

fn enhance_instruction(user_message: &str) -> String {
    format!(
        "You are a prompt enhancement specialist. \
         Transform the following user input into a detailed, comprehensive prompt \
         that will elicit a thorough, informative response from an AI assistant.\n\n\
         Make the prompt:\n\
         - More specific and detailed\n\
         - Include request for examples and explanations\n\
         - Ask for step-by-step breakdowns where relevant\n\
         - Request practical applications or use cases\n\
         - Encourage comprehensive coverage of the topic\n\n\
         User input: {user_message}\n\n\
         Enhanced prompt (output ONLY the enhanced prompt, nothing else):"
    )
}

/// Reject conversations the pipeline cannot answer
pub fn validate_conversation(conversation: &[Turn]) -> Result<()> {
    let last = conversation.last().ok_or_else(|| RelayError::ValidationError {
        message: "Messages array is required".to_string(),
    })?;

    if last.role != Role::User {
        return Err(RelayError::ValidationError {
            message: "Last message must come from the user".to_string(),
        });
    }

    if last.content.trim().is_empty() {
        return Err(RelayError::ValidationError {
            message: "Last message must not be empty".to_string(),
        });
    }

    Ok(())
}

/// Multi-stage chat pipeline
#[derive(Clone)]
pub struct Workflow {
    primary: Arc<dyn Provider>,
    primary_key: Option<Credential>,
    primary_model: String,
    system_prompt: String,
    retrier: Arc<RotationRetrier>,
    translator: ChunkTranslator,
    keys: KeyRing,
    enhance_model: String,
    translate_model: String,
}

impl Workflow {
    /// Assemble a workflow from explicit providers and pools
    pub fn new(
        config: &RelayConfig,
        primary: Arc<dyn Provider>,
        fallback: Arc<dyn Provider>,
        keys: KeyRing,
    ) -> Self {
        let retrier = Arc::new(RotationRetrier::new(
            fallback,
            FallbackChain::new(config.fallback_models.iter().cloned()),
            config.retry_policy(),
        ));
        let translator = ChunkTranslator::new(retrier.clone(), config.chunk_settings());

        Self {
            primary,
            primary_key: config
                .primary_api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .map(Credential::new),
            primary_model: config.primary_model.clone(),
            system_prompt: config.system_prompt.clone(),
            retrier,
            translator,
            keys,
            enhance_model: config.enhance_model.clone(),
            translate_model: config.translate_model.clone(),
        }
    }

    /// Build the Anthropic primary, Gemini fallback and key pools from configuration
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = ProviderClient::new(config.timeout())?;
        let primary = AnthropicProvider::new(client.clone(), config.primary_endpoint.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature);
        let fallback = GeminiProvider::new(client, config.fallback_endpoint.clone());

        let keys = KeyRing::new()
            .with_pool(KeyPool::from_file(ENHANCE_POOL, &config.enhance_keys_file)?)
            .with_pool(KeyPool::from_file(TRANSLATE_POOL, &config.translate_keys_file)?);

        Ok(Self::new(config, Arc::new(primary), Arc::new(fallback), keys))
    }

    pub fn keys(&self) -> &KeyRing {
        &self.keys
    }

    pub fn chain(&self) -> &FallbackChain {
        self.retrier.chain()
    }

    pub fn translator(&self) -> &ChunkTranslator {
        &self.translator
    }

    pub fn primary_configured(&self) -> bool {
        self.primary_key.is_some()
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    pub fn enhance_model(&self) -> &str {
        &self.enhance_model
    }

    pub fn translate_model(&self) -> &str {
        &self.translate_model
    }

    /// Whether a stage backed by the named pool will run
    pub fn stage_enabled(&self, pool: &str) -> bool {
        self.keys.size(pool) > 0
    }

    /// Human-readable summary of the active stages
    pub fn describe(&self) -> String {
        let mut stages = Vec::new();
        if self.stage_enabled(ENHANCE_POOL) {
            stages.push(format!("{} (enhance)", self.enhance_model));
        }
        stages.push(self.primary_model.clone());
        if self.stage_enabled(TRANSLATE_POOL) {
            stages.push(format!(
                "{} (translate to {})",
                self.translate_model,
                self.translator.settings().target_language
            ));
        }
        stages.join(" → ")
    }

    /// Run the pipeline for one conversation
    pub async fn run(&self, conversation: Vec<Turn>) -> Result<WorkflowOutcome> {
        validate_conversation(&conversation)?;

        let primary_key = self.primary_key.clone().ok_or_else(|| RelayError::ConfigError {
            message: "Primary API key not configured. Set ANTHROPIC_API_KEY.".to_string(),
        })?;

        let mut conversation = conversation;
        let user_message = conversation
            .last()
            .map(|t| t.content.clone())
            .unwrap_or_default();
        info!("Starting workflow for {} turns", conversation.len());

        let (prompt, enhance) = self.enhance(&user_message).await;
        if let Some(last) = conversation.last_mut() {
            last.content = prompt;
        }

        let generated = self.generate(conversation, &primary_key).await?;

        let (response, translate) = self.translate(generated).await;

        info!("Workflow complete");
        Ok(WorkflowOutcome {
            response,
            stages: StageReport {
                enhance,
                generate: StageStatus::Completed,
                translate,
            },
        })
    }

    async fn enhance(&self, user_message: &str) -> (String, StageStatus) {
        let Some(pool) = self.enabled_pool(ENHANCE_POOL) else {
            info!("Enhancement skipped, no keys");
            return (user_message.to_string(), StageStatus::Skipped);
        };

        info!("Enhancing prompt with {}", self.enhance_model);
        let prompt = Prompt::text(enhance_instruction(user_message));
        match self
            .retrier
            .call_with_rotation(&self.enhance_model, &prompt, &pool)
            .await
        {
            Ok(enhanced) if enhanced.trim().is_empty() => {
                warn!("Prompt enhancement came back empty, using original prompt");
                (
                    user_message.to_string(),
                    StageStatus::Degraded {
                        reason: "empty enhancement".to_string(),
                    },
                )
            }
            Ok(enhanced) => (enhanced, StageStatus::Completed),
            Err(e) => {
                warn!("Prompt enhancement failed, using original prompt: {}", e);
                (
                    user_message.to_string(),
                    StageStatus::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    async fn generate(&self, conversation: Vec<Turn>, key: &Credential) -> Result<String> {
        info!("Generating response with {}", self.primary_model);
        let prompt = Prompt {
            system: Some(self.system_prompt.clone()),
            turns: conversation,
        };

        match self.primary.invoke(&self.primary_model, key, &prompt).await {
            InvokeOutcome::Success(text) => Ok(text),
            InvokeOutcome::Retryable(failure) => Err(RelayError::RetryableProvider {
                model: self.primary_model.clone(),
                failure,
            }),
            InvokeOutcome::Fatal(failure) => Err(RelayError::FatalProvider {
                model: self.primary_model.clone(),
                failure,
            }),
        }
    }

    async fn translate(&self, generated: String) -> (String, StageStatus) {
        let Some(pool) = self.enabled_pool(TRANSLATE_POOL) else {
            info!("Translation skipped, no keys");
            return (generated, StageStatus::Skipped);
        };

        match self
            .translator
            .translate(&generated, &self.translate_model, &pool)
            .await
        {
            Ok(report) if report.total_chunks == 0 => (generated, StageStatus::Completed),
            Ok(report) if report.is_complete() => (report.text, StageStatus::Completed),
            Ok(report) if report.translated_chunks == 0 => (
                generated,
                StageStatus::Degraded {
                    reason: "no chunk could be translated".to_string(),
                },
            ),
            Ok(report) => (
                report.text,
                StageStatus::Partial {
                    translated: report.translated_chunks,
                    total: report.total_chunks,
                },
            ),
            Err(e) => {
                warn!("Translation failed, returning untranslated text: {}", e);
                (
                    generated,
                    StageStatus::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    fn enabled_pool(&self, name: &str) -> Option<Arc<KeyPool>> {
        self.keys.pool(name).filter(|p| !p.is_empty())
    }
}
