//! Error types for Reply Pilot.

use std::time::Duration;

/// Top-level error type for the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
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

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout { .. })
    }
}

/// Pipeline-related errors.
///
/// These never escape `Orchestrator::process` — every variant is mapped to a
/// typed fallback inside the pipeline. They exist so component internals can
/// use `?` and so logs carry a precise failure site.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Sentiment escalation failed: {0}")]
    Sentiment(String),

    #[error("Reply generation failed: {0}")]
    Reply(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Ingest coordinator errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No active channel for {channel} recipient {recipient}")]
    ChannelNotFound { channel: String, recipient: String },

    #[error("State resolution failed: {0}")]
    Resolve(String),

    #[error("Persistence failed: {0}")]
    Persist(String),

    #[error("Fan-out enqueue failed for {queue}: {reason}")]
    Enqueue { queue: String, reason: String },
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;
