//! Durable run history.
//!
//! The orchestrator pushes every event, a checkpoint at each major
//! transition and a terminal marker into a [`HistoryRecorder`]. Writes are
//! append-only and idempotent per (run, event sequence), so a replayed
//! delivery never duplicates a record. Recorder failures are logged by the
//! engine and never fail a run.

mod file;
mod memory;
mod store;

pub use file::FileHistoryRecorder;
pub use memory::InMemoryHistoryRecorder;
pub use store::{InMemoryRunStore, RunStore};

use crate::context::{RunId, RunSnapshot};
use crate::core::{PipelineEvent, RunStatus};
use crate::errors::{HistoryError, SubscriberError};
use crate::events::{EventSubscriber, SharedEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terminal marker of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalRecord {
    /// The run.
    pub run_id: RunId,
    /// Terminal status.
    pub status: RunStatus,
    /// Failure detail, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// When the marker was written.
    pub recorded_at: DateTime<Utc>,
}

impl TerminalRecord {
    /// Creates a terminal marker stamped now.
    #[must_use]
    pub fn new(run_id: RunId, status: RunStatus, error_detail: Option<String>) -> Self {
        Self {
            run_id,
            status,
            error_detail,
            recorded_at: Utc::now(),
        }
    }
}

/// Durable sink for run events, checkpoints and terminal markers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryRecorder: Send + Sync {
    /// Appends one event. A second write of the same sequence is ignored.
    async fn record_stage_event(&self, run_id: RunId, event: &PipelineEvent) -> Result<(), HistoryError>;

    /// Persists a snapshot taken at a major transition.
    async fn checkpoint(&self, run_id: RunId, snapshot: &RunSnapshot) -> Result<(), HistoryError>;

    /// Records the terminal status of a run.
    async fn mark_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        error_detail: Option<String>,
    ) -> Result<(), HistoryError>;

    /// Events of a run in sequence order.
    async fn events(&self, run_id: RunId) -> Result<Vec<PipelineEvent>, HistoryError>;

    /// Most recent checkpoint of a run.
    async fn latest_checkpoint(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError>;

    /// Terminal marker of a run, if it ended.
    async fn terminal(&self, run_id: RunId) -> Result<Option<TerminalRecord>, HistoryError>;
}

/// Recorder that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHistoryRecorder;

#[async_trait]
impl HistoryRecorder for NoOpHistoryRecorder {
    async fn record_stage_event(&self, _run_id: RunId, _event: &PipelineEvent) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn checkpoint(&self, _run_id: RunId, _snapshot: &RunSnapshot) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn mark_terminal(
        &self,
        _run_id: RunId,
        _status: RunStatus,
        _error_detail: Option<String>,
    ) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn events(&self, _run_id: RunId) -> Result<Vec<PipelineEvent>, HistoryError> {
        Ok(Vec::new())
    }

    async fn latest_checkpoint(&self, _run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError> {
        Ok(None)
    }

    async fn terminal(&self, _run_id: RunId) -> Result<Option<TerminalRecord>, HistoryError> {
        Ok(None)
    }
}

/// Bus subscriber that forwards every event to a recorder.
pub struct HistorySubscriber {
    recorder: Arc<dyn HistoryRecorder>,
}

impl HistorySubscriber {
    /// Creates a forwarding subscriber.
    #[must_use]
    pub fn new(recorder: Arc<dyn HistoryRecorder>) -> Self {
        Self { recorder }
    }
}

impl std::fmt::Debug for HistorySubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistorySubscriber").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSubscriber for HistorySubscriber {
    fn name(&self) -> &str {
        "history"
    }

    async fn on_event(&self, event: SharedEvent) -> Result<(), SubscriberError> {
        self.recorder
            .record_stage_event(event.run_id, &event)
            .await
            .map_err(|e| SubscriberError::new("history", e.to_string()))
    }
}
