//! Configuration types.

use std::time::Duration;

/// Pipeline configuration.
///
/// Model choices mirror the two-tier cost model: `fast_model` handles
/// structured extraction (classification, sentiment escalation), while
/// `primary_model` generates customer-facing reply text.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model for customer-facing reply generation.
    pub primary_model: String,
    /// Model for structured extraction calls.
    pub fast_model: String,
    /// Max output tokens for reply generation.
    pub max_tokens: u32,
    /// Temperature for reply generation.
    pub temperature: f32,
    /// Timeout applied to every generative call.
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary_model: "claude-sonnet-4-20250514".to_string(),
            fast_model: "claude-3-5-haiku-latest".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            call_timeout: Duration::from_secs(15),
        }
    }
}

/// Ingest worker configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// How many platform message ids the dedup window retains.
    pub dedup_window: usize,
    /// How many recent turns to hand the pipeline.
    pub history_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_window: 4096,
            history_limit: 10,
        }
    }
}
