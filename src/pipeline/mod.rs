//! The decision pipeline: one inbound message in, one complete
//! `PipelineOutput` out.

pub mod classifier;
pub mod escalation;
pub mod guardrail;
pub mod lead_score;
pub mod orchestrator;
mod prompts;
pub mod reply;
pub mod sentiment;
pub mod tiered;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::*;
