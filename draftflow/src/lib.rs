//! # Draftflow
//!
//! A staged content-drafting pipeline engine.
//!
//! Draftflow drives a fixed sequence of stages over one shared run state:
//!
//! - **Fixed stage graph**: validate, strategize, write, an optional visual
//!   pass for carousels, optimize, finalize
//! - **Pause and resume**: a run suspends after strategize and continues once
//!   the author's answers arrive
//! - **Bounded revision loop**: optimize can send the draft back to write a
//!   configurable number of times
//! - **Ordered event stream**: sequenced events with monotonic progress and a
//!   single terminal `done`
//! - **Replayable history**: events, checkpoints and terminal markers go to a
//!   pluggable recorder
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use draftflow::prelude::*;
//!
//! let stages = StageSet::new(validator, strategist, writer, designer, optimizer);
//! let orchestrator = Orchestrator::new(stages, EngineConfig::from_env()?);
//!
//! let run_id = RunId::new();
//! let paused = orchestrator.start(run_id, RunInput::new("my idea"), profile).await;
//! // show paused.pending_questions to the author...
//! let done = orchestrator.resume(run_id, paused, answers).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod history;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EngineConfig, FailurePolicy};
    pub use crate::context::{ExternalAnswers, PipelineState, RunId, RunInput, StageInput};
    pub use crate::core::{
        FinalPost, PipelineEvent, PostFormat, RunStatus, StageName, StageOutput, StageResult,
        StageStatus,
    };
    pub use crate::errors::{DraftflowError, InvalidStateError, InvalidStateKind};
    pub use crate::events::{EventSubscriber, FnSubscriber, LoggingSubscriber, SharedEvent};
    pub use crate::history::{
        FileHistoryRecorder, HistoryRecorder, InMemoryHistoryRecorder, InMemoryRunStore, RunStore,
    };
    pub use crate::observability::{init_logging, LogFormat};
    pub use crate::pipeline::{Orchestrator, RetryPolicy};
    pub use crate::stages::{AsyncFnStage, FnStage, Stage, StageSet};
}
