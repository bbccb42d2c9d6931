//! Error types for the draftflow engine.
//!
//! Only [`InvalidStateError`] crosses the orchestrator's public boundary.
//! Stage failures are recorded as data in the execution log and subscriber
//! failures are logged and swallowed by the event bus.

use crate::context::RunId;
use crate::core::{RunStatus, StageName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for draftflow operations.
#[derive(Debug, Error)]
pub enum DraftflowError {
    /// A state handed to the engine cannot be resumed.
    #[error("{0}")]
    InvalidState(#[from] InvalidStateError),

    /// A stage failed after exhausting its retries.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// The history backend rejected a write or read.
    #[error("{0}")]
    History(#[from] HistoryError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a state was refused by `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidStateKind {
    /// The run is not suspended at the pause point.
    NotAwaitingInput,
    /// The revision counter is past its ceiling.
    RevisionBoundExceeded,
    /// External answers were already supplied once.
    AnswersAlreadySet,
    /// The state belongs to another run.
    RunMismatch,
    /// No stored state exists for the run.
    UnknownRun,
    /// The run already reached a terminal status.
    AlreadyTerminal,
    /// A persisted snapshot failed its integrity check.
    CorruptSnapshot,
    /// The requested status change is not allowed from the current status.
    IllegalTransition,
}

impl std::fmt::Display for InvalidStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAwaitingInput => write!(f, "not_awaiting_input"),
            Self::RevisionBoundExceeded => write!(f, "revision_bound_exceeded"),
            Self::AnswersAlreadySet => write!(f, "answers_already_set"),
            Self::RunMismatch => write!(f, "run_mismatch"),
            Self::UnknownRun => write!(f, "unknown_run"),
            Self::AlreadyTerminal => write!(f, "already_terminal"),
            Self::CorruptSnapshot => write!(f, "corrupt_snapshot"),
            Self::IllegalTransition => write!(f, "illegal_transition"),
        }
    }
}

/// Fatal error raised when a run cannot continue from the supplied state.
#[derive(Debug, Clone, Error)]
#[error("Invalid state for run {run_id} ({kind}): {message}")]
pub struct InvalidStateError {
    /// The run the state was submitted for.
    pub run_id: RunId,
    /// Category of the violation.
    pub kind: InvalidStateKind,
    /// Human-readable detail.
    pub message: String,
    /// Status the state carried, if it could be read.
    pub status: Option<RunStatus>,
}

impl InvalidStateError {
    /// Creates a new invalid state error.
    #[must_use]
    pub fn new(run_id: RunId, kind: InvalidStateKind, message: impl Into<String>) -> Self {
        Self {
            run_id,
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Records the status found on the rejected state.
    #[must_use]
    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("InvalidState"));
        map.insert("run_id".to_string(), serde_json::json!(self.run_id.to_string()));
        map.insert("kind".to_string(), serde_json::json!(self.kind));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(status) = self.status {
            map.insert("status".to_string(), serde_json::json!(status));
        }
        map
    }
}

/// A stage's logic failed after all attempts.
#[derive(Debug, Clone, Error)]
#[error("Stage {stage} failed after {attempts} attempt(s): {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: StageName,
    /// Last error message.
    pub message: String,
    /// Attempts made.
    pub attempts: u32,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: StageName, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            stage,
            message: message.into(),
            attempts,
        }
    }
}

/// An event subscriber failed while handling an event.
#[derive(Debug, Clone, Error)]
#[error("Subscriber '{subscriber}' failed: {message}")]
pub struct SubscriberError {
    /// Name of the subscriber.
    pub subscriber: String,
    /// Failure description.
    pub message: String,
}

impl SubscriberError {
    /// Creates a new subscriber error.
    #[must_use]
    pub fn new(subscriber: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by history backends.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The backend could not persist the record.
    #[error("History write failed for run {run_id}: {reason}")]
    WriteFailed {
        /// The run being recorded.
        run_id: RunId,
        /// The reason for failure.
        reason: String,
    },

    /// A stored record could not be decoded.
    #[error("History record for run {run_id} is unreadable: {reason}")]
    Corrupt {
        /// The run being read.
        run_id: RunId,
        /// The reason for failure.
        reason: String,
    },

    /// IO error from a file-backed recorder.
    #[error("History IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error.
    #[error("History encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl HistoryError {
    /// Creates a write failure.
    #[must_use]
    pub fn write_failed(run_id: RunId, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            run_id,
            reason: reason.into(),
        }
    }

    /// Creates a corrupt record error.
    #[must_use]
    pub fn corrupt(run_id: RunId, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            run_id,
            reason: reason.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DraftflowError> = std::result::Result<T, E>;
