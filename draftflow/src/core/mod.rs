//! Core domain model types for draftflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Stage names, stage status and run status
//! - Validate/optimize decisions and post formats
//! - Stage output payloads and domain artifacts
//! - Stage results and pipeline events

mod artifact;
mod decision;
mod event;
mod output;
mod result;
mod status;

pub use artifact::{best_hook, ClarifyingQuestion, FinalPost, HookVariant};
pub use decision::{OptimizeDecision, PostFormat, ValidateDecision};
pub use event::{EventDraft, EventKind, PipelineEvent};
pub use output::{keys, StageOutput};
pub use result::StageResult;
pub use status::{RunStatus, StageName, StageStatus};
