//! Two-tier combinators for mixing rule engines with generative calls.
//!
//! Three components share the same shape — a cheap deterministic tier and an
//! expensive generative tier with a defined winner on failure. These
//! combinators keep that try/escalate/fall-back control flow in one place.

use std::future::Future;

use tracing::warn;

use crate::error::PipelineError;

/// A value with the confidence of the tier that produced it.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub value: T,
    pub confidence: f32,
}

impl<T> Scored<T> {
    pub fn new(value: T, confidence: f32) -> Self {
        Self { value, confidence }
    }
}

/// Deterministic tier first; escalate to the generative tier only when the
/// deterministic confidence is at or below `threshold`.
///
/// Escalation failure returns the deterministic value regardless of its
/// confidence — availability over accuracy. The bool reports whether the
/// generative tier's answer was used.
pub async fn deterministic_first<T, Fut>(
    deterministic: Scored<T>,
    threshold: f32,
    escalate: Fut,
) -> (T, bool)
where
    Fut: Future<Output = Result<T, PipelineError>>,
{
    if deterministic.confidence > threshold {
        return (deterministic.value, false);
    }

    match escalate.await {
        Ok(value) => (value, true),
        Err(e) => {
            warn!(error = %e, "Escalation failed, keeping deterministic result");
            (deterministic.value, false)
        }
    }
}

/// Generative tier first; any failure falls back unconditionally to the
/// deterministic producer. The bool reports whether the generative tier's
/// answer was used.
pub async fn generative_first<T, Fut, F>(primary: Fut, fallback: F) -> (T, bool)
where
    Fut: Future<Output = Result<T, PipelineError>>,
    F: FnOnce() -> T,
{
    match primary.await {
        Ok(value) => (value, true),
        Err(e) => {
            warn!(error = %e, "Generative call failed, using deterministic fallback");
            (fallback(), false)
        }
    }
}
