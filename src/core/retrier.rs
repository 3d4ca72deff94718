//! Key and model rotation over a fallback chain

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::errors::{RelayError, Result};
use crate::core::invoker::{InvokeOutcome, Provider};
use crate::core::key_pool::KeyPool;
use crate::core::models::{AttemptRecord, FallbackChain, Prompt};

/// Attempt budget and pacing for rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Invocations per model before moving to the next model
    pub max_key_attempts: usize,
    /// Fixed wait between attempts on the same model
    pub attempt_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_key_attempts: 10,
            attempt_delay: Duration::from_secs(2),
        }
    }
}

/// Drives a provider across pool keys and fallback models until one call succeeds
#[derive(Clone)]
pub struct RotationRetrier {
    provider: Arc<dyn Provider>,
    chain: FallbackChain,
    policy: RetryPolicy,
}

impl RotationRetrier {
    pub fn new(provider: Arc<dyn Provider>, chain: FallbackChain, policy: RetryPolicy) -> Self {
        Self {
            provider,
            chain,
            policy,
        }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// Rotate with the policy's per-model attempt budget
    pub async fn call_with_rotation(
        &self,
        preferred_model: &str,
        prompt: &Prompt,
        pool: &KeyPool,
    ) -> Result<String> {
        self.call_with_budget(preferred_model, prompt, pool, self.policy.max_key_attempts)
            .await
    }

    /// Try every model once, starting at `preferred_model`, each with up to
    /// `max_key_attempts_per_model` keys drawn from `pool`.
    pub async fn call_with_budget(
        &self,
        preferred_model: &str,
        prompt: &Prompt,
        pool: &KeyPool,
        max_key_attempts_per_model: usize,
    ) -> Result<String> {
        if pool.is_empty() {
            return Err(RelayError::PoolExhausted {
                pool: pool.name().to_string(),
            });
        }

        let mut attempts = 0;
        let mut last_failure = None;

        for model in self.chain.attempt_order(preferred_model) {
            info!("Trying model: {}", model.name);

            for key_attempt in 0..max_key_attempts_per_model {
                let credential = pool.acquire()?;
                attempts += 1;

                let outcome = self
                    .provider
                    .invoke(&model.name, &credential, prompt)
                    .await;
                log_attempt(
                    self.provider.name(),
                    &AttemptRecord {
                        model: model.name.clone(),
                        key: credential.fingerprint(),
                        attempt: key_attempt + 1,
                        outcome: outcome.label(),
                    },
                );

                match outcome {
                    InvokeOutcome::Success(text) => {
                        info!("Success with model: {}", model.name);
                        return Ok(text);
                    }
                    InvokeOutcome::Fatal(failure) => {
                        warn!("Fatal failure from {}: {}", model.name, failure);
                        return Err(RelayError::FatalProvider {
                            model: model.name.clone(),
                            failure,
                        });
                    }
                    InvokeOutcome::Retryable(failure) => {
                        warn!(
                            "Key attempt {}/{} failed for {}: {}",
                            key_attempt + 1,
                            max_key_attempts_per_model,
                            model.name,
                            failure
                        );
                        last_failure = Some(failure);

                        if key_attempt + 1 < max_key_attempts_per_model {
                            sleep(self.policy.attempt_delay).await;
                        }
                    }
                }
            }

            warn!("All keys exhausted for {}, trying next model", model.name);
        }

        Err(RelayError::AllProvidersExhausted {
            attempts,
            last_failure,
        })
    }
}

fn log_attempt(provider: &str, record: &AttemptRecord) {
    debug!(
        provider,
        model = %record.model,
        key = %record.key,
        attempt = record.attempt,
        outcome = %record.outcome,
        "provider attempt"
    );
}
