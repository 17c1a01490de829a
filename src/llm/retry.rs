//! Bounded retry with backoff for generative calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Attempts per call (initial try + retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts; doubles per retry unless the provider
/// supplied a retry-after hint.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Issue a completion with a per-attempt timeout, retrying retryable errors.
///
/// Non-retryable errors return immediately; the last error is returned after
/// the attempt budget is exhausted.
pub(crate) async fn complete_with_retry(
    provider: &Arc<dyn LlmProvider>,
    request: CompletionRequest,
    timeout: Duration,
) -> Result<CompletionResponse, LlmError> {
    let mut last_error = None;

    for attempt in 0..MAX_ATTEMPTS {
        let result = tokio::time::timeout(timeout, provider.complete(request.clone()))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: provider.model_name().to_string(),
                timeout,
            })
            .and_then(|inner| inner);

        match result {
            Ok(response) => {
                debug!(
                    model = provider.model_name(),
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    cost_usd = %costs::call_cost(
                        provider.model_name(),
                        response.input_tokens,
                        response.output_tokens,
                    ),
                    "Generative call completed"
                );
                return Ok(response);
            }
            Err(e) if e.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let backoff = match &e {
                    LlmError::RateLimited {
                        retry_after: Some(after),
                        ..
                    } => *after,
                    _ => BASE_BACKOFF * 2u32.pow(attempt),
                };
                warn!(
                    model = provider.model_name(),
                    attempt = attempt + 1,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Generative call failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::RequestFailed {
        provider: provider.model_name().to_string(),
        reason: "retry budget exhausted".to_string(),
    }))
}
