//! Error types for the lead qualifier.
//!
//! The decision core itself never fails: malformed model output, bad numeric
//! values and inconsistent flow graphs all degrade to defaults. These types
//! cover the edges around it (loading configuration and talking to the
//! model provider).

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors raised by a [`Classifier`](crate::classify::Classifier).
///
/// Callers treat every variant the same way: fall back to the default
/// classification and keep the conversation going.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),
}
