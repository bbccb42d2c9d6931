//! Run context.
//!
//! This module provides:
//! - Run identity
//! - The mutable pipeline state and its original request
//! - Read-only stage input views
//! - Fingerprinted snapshots for checkpoints and stored runs

mod identity;
mod input;
mod snapshot;
mod state;

pub use identity::RunId;
pub use input::StageInput;
pub use snapshot::RunSnapshot;
pub use state::{ExternalAnswers, PipelineState, RunInput};
