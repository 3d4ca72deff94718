//! LLM Relay - multi-provider chat pipeline
//!
//! Routes a chat message through optional prompt enhancement, primary generation and
//! chunked translation, rotating credentials and falling back across models on failure.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;
pub mod providers;
pub mod server;

// Re-export key types for convenience
pub use self::core::{
    config::RelayConfig,
    errors::{RelayError, Result},
    invoker::{InvokeOutcome, Provider, ProviderFailure},
    key_pool::{KeyPool, KeyRing},
    models::{Credential, FallbackChain, Prompt, Role, StageReport, StageStatus, Turn},
    retrier::{RetryPolicy, RotationRetrier},
    translator::{ChunkSettings, ChunkTranslator},
    workflow::Workflow,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
