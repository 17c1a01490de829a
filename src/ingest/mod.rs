//! Worker-side ingestion: dedup, state resolution, pipeline invocation,
//! persistence, and fan-out.

pub mod coordinator;
pub mod dedup;
pub mod memory;
pub mod types;

pub use coordinator::{IngestCoordinator, IngestOutcome};
pub use types::*;
