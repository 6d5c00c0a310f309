//! Error types for the analysis engine.
//!
//! Provider failures are classified so the request gate can decide
//! whether a retry makes sense. Application code above the engine
//! wraps these in `anyhow`.

use std::time::Duration;
use thiserror::Error;

/// Classified failure from the external reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Upstream asked us to slow down.
    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Credentials rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Network trouble, timeouts, 5xx.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The request or the response could not be understood.
    #[error("malformed provider exchange: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the gate should retry after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Transient(_)
        )
    }

    /// Server-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Terminal outcome of `RequestGate::execute`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// Non-retryable failure, surfaced on the first attempt.
    #[error(transparent)]
    Rejected(ProviderError),
}

/// Error returned to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis of {file_path} failed: {source}")]
    Failed {
        file_path: String,
        #[source]
        source: GateError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(ProviderError::Transient("reset".to_string()).is_retryable());
        assert!(!ProviderError::Auth("bad key".to_string()).is_retryable());
        assert!(!ProviderError::Malformed("400".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(ProviderError::Transient("x".to_string()).retry_after(), None);
    }

    #[test]
    fn test_analysis_error_names_file() {
        let err = AnalysisError::Failed {
            file_path: "src/billing.rs".to_string(),
            source: GateError::RetriesExhausted {
                attempts: 4,
                source: ProviderError::RateLimited { retry_after: None },
            },
        };
        let message = err.to_string();
        assert!(message.contains("src/billing.rs"));
        assert!(message.contains("4 attempts"));
    }
}
