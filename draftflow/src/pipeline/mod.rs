//! Pipeline execution.
//!
//! This module provides:
//! - The retry policy and the single-stage runner
//! - The fixed stage graph and the revision loop controller
//! - Final post assembly
//! - The orchestrator driving runs across the pause point

mod finalize;
mod graph;
mod orchestrator;
mod retry;
mod revision;
mod runner;


pub use finalize::assemble;
pub use graph::{next_after, Transition, ENTRY, RESUME_ENTRY};
pub use orchestrator::Orchestrator;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
pub use revision::should_revise;
pub use runner::StageRunner;
