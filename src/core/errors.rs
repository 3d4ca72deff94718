//! Custom error types for relay operations

use thiserror::Error;

use crate::core::invoker::ProviderFailure;

/// Relay-related errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing mandatory credential or invalid configuration
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// Malformed caller input
    #[error("Invalid request: {message}")]
    ValidationError {
        message: String,
    },

    /// A credential pool has no entries, the stage using it is disabled
    #[error("Key pool '{pool}' is empty")]
    PoolExhausted {
        pool: String,
    },

    /// Transient provider failure that was not retried
    #[error("Provider error from {model}: {failure}")]
    RetryableProvider {
        model: String,
        failure: ProviderFailure,
    },

    /// Permanent provider rejection, rotating keys cannot fix it
    #[error("Provider rejected request for {model}: {failure}")]
    FatalProvider {
        model: String,
        failure: ProviderFailure,
    },

    /// Every model and key combination failed
    #[error("All providers exhausted after {attempts} attempts")]
    AllProvidersExhausted {
        attempts: usize,
        last_failure: Option<ProviderFailure>,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Reqwest error
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RelayError {
    /// The provider failure behind this error, if any
    pub fn provider_failure(&self) -> Option<&ProviderFailure> {
        match self {
            RelayError::RetryableProvider { failure, .. }
            | RelayError::FatalProvider { failure, .. } => Some(failure),
            RelayError::AllProvidersExhausted { last_failure, .. } => last_failure.as_ref(),
            _ => None,
        }
    }

    /// HTTP status code a caller should see for this error
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::ValidationError { .. } => 400,
            RelayError::FatalProvider { .. } => 400,
            RelayError::ConfigError { .. } => 500,
            _ => match self.provider_failure().and_then(|f| f.status) {
                Some(401) => 401,
                Some(429) => 429,
                Some(400) => 400,
                _ => 500,
            },
        }
    }
}

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(status: Option<u16>) -> ProviderFailure {
        ProviderFailure::new(status, "boom")
    }

    #[test]
    fn test_status_code_follows_last_failure() {
        let err = RelayError::AllProvidersExhausted {
            attempts: 4,
            last_failure: Some(failure(Some(429))),
        };
        assert_eq!(err.status_code(), 429);

        let err = RelayError::AllProvidersExhausted {
            attempts: 4,
            last_failure: Some(failure(None)),
        };
        assert_eq!(err.status_code(), 500);

        let err = RelayError::RetryableProvider {
            model: "m".to_string(),
            failure: failure(Some(401)),
        };
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_status_code_for_caller_errors() {
        let err = RelayError::ValidationError {
            message: "empty".to_string(),
        };
        assert_eq!(err.status_code(), 400);

        let err = RelayError::ConfigError {
            message: "missing key".to_string(),
        };
        assert_eq!(err.status_code(), 500);
    }
}
