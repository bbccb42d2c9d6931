//! In-memory history recorder.

use super::{HistoryRecorder, TerminalRecord};
use crate::context::{RunId, RunSnapshot};
use crate::core::{PipelineEvent, RunStatus};
use crate::errors::HistoryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct RunHistory {
    events: BTreeMap<u64, PipelineEvent>,
    checkpoints: Vec<RunSnapshot>,
    terminal: Option<TerminalRecord>,
}

/// Keeps history in process memory.
#[derive(Debug, Default)]
pub struct InMemoryHistoryRecorder {
    runs: Mutex<HashMap<RunId, RunHistory>>,
}

impl InMemoryHistoryRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints taken for a run.
    #[must_use]
    pub fn checkpoint_count(&self, run_id: RunId) -> usize {
        self.runs
            .lock()
            .get(&run_id)
            .map_or(0, |h| h.checkpoints.len())
    }

    /// Number of runs with any history.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

#[async_trait]
impl HistoryRecorder for InMemoryHistoryRecorder {
    async fn record_stage_event(&self, run_id: RunId, event: &PipelineEvent) -> Result<(), HistoryError> {
        let mut runs = self.runs.lock();
        runs.entry(run_id)
            .or_default()
            .events
            .entry(event.sequence)
            .or_insert_with(|| event.clone());
        Ok(())
    }

    async fn checkpoint(&self, run_id: RunId, snapshot: &RunSnapshot) -> Result<(), HistoryError> {
        self.runs
            .lock()
            .entry(run_id)
            .or_default()
            .checkpoints
            .push(snapshot.clone());
        Ok(())
    }

    async fn mark_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        error_detail: Option<String>,
    ) -> Result<(), HistoryError> {
        self.runs.lock().entry(run_id).or_default().terminal =
            Some(TerminalRecord::new(run_id, status, error_detail));
        Ok(())
    }

    async fn events(&self, run_id: RunId) -> Result<Vec<PipelineEvent>, HistoryError> {
        Ok(self
            .runs
            .lock()
            .get(&run_id)
            .map(|h| h.events.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn latest_checkpoint(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError> {
        Ok(self
            .runs
            .lock()
            .get(&run_id)
            .and_then(|h| h.checkpoints.last().cloned()))
    }

    async fn terminal(&self, run_id: RunId) -> Result<Option<TerminalRecord>, HistoryError> {
        Ok(self.runs.lock().get(&run_id).and_then(|h| h.terminal.clone()))
    }
}
