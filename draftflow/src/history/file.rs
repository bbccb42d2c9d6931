//! JSON-lines file history recorder.
//!
//! Every record is one line appended to a single file. Event records carry
//! their run id and sequence; a sequence already on disk is never written
//! twice, including across a reopen of the same file.

use super::{HistoryRecorder, TerminalRecord};
use crate::context::{RunId, RunSnapshot};
use crate::core::{PipelineEvent, RunStatus};
use crate::errors::HistoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Event { event: PipelineEvent },
    Checkpoint { snapshot: RunSnapshot },
    Terminal { terminal: TerminalRecord },
}

impl Record {
    const fn run_id(&self) -> RunId {
        match self {
            Self::Event { event } => event.run_id,
            Self::Checkpoint { snapshot } => snapshot.state.run_id,
            Self::Terminal { terminal } => terminal.run_id,
        }
    }
}

/// Appends history to a JSON-lines file.
#[derive(Debug)]
pub struct FileHistoryRecorder {
    path: PathBuf,
    written: Mutex<HashSet<(RunId, u64)>>,
}

impl FileHistoryRecorder {
    /// Opens (or creates on first write) the history file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let recorder = Self {
            path,
            written: Mutex::new(HashSet::new()),
        };

        let mut seen = HashSet::new();
        for record in recorder.read_all().await? {
            if let Record::Event { event } = record {
                seen.insert((event.run_id, event.sequence));
            }
        }
        debug!(path = %recorder.path.display(), events = seen.len(), "History file opened");
        *recorder.written.lock().await = seen;
        Ok(recorder)
    }

    /// Path of the history file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &Record) -> Result<(), HistoryError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Record>, HistoryError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping unreadable history line"
                ),
            }
        }
        Ok(records)
    }

    async fn records_for(&self, run_id: RunId) -> Result<Vec<Record>, HistoryError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.run_id() == run_id)
            .collect())
    }
}

#[async_trait]
impl HistoryRecorder for FileHistoryRecorder {
    async fn record_stage_event(&self, run_id: RunId, event: &PipelineEvent) -> Result<(), HistoryError> {
        if event.run_id != run_id {
            return Err(HistoryError::write_failed(
                run_id,
                format!("event belongs to run {}", event.run_id),
            ));
        }

        let mut written = self.written.lock().await;
        if written.contains(&(run_id, event.sequence)) {
            debug!(%run_id, sequence = event.sequence, "Duplicate event ignored");
            return Ok(());
        }
        self.append(&Record::Event { event: event.clone() }).await?;
        written.insert((run_id, event.sequence));
        Ok(())
    }

    async fn checkpoint(&self, run_id: RunId, snapshot: &RunSnapshot) -> Result<(), HistoryError> {
        if snapshot.run_id() != run_id {
            return Err(HistoryError::write_failed(run_id, "snapshot belongs to another run"));
        }
        let _guard = self.written.lock().await;
        self.append(&Record::Checkpoint {
            snapshot: snapshot.clone(),
        })
        .await
    }

    async fn mark_terminal(
        &self,
        run_id: RunId,
        status: RunStatus,
        error_detail: Option<String>,
    ) -> Result<(), HistoryError> {
        let _guard = self.written.lock().await;
        self.append(&Record::Terminal {
            terminal: TerminalRecord::new(run_id, status, error_detail),
        })
        .await
    }

    async fn events(&self, run_id: RunId) -> Result<Vec<PipelineEvent>, HistoryError> {
        let mut by_sequence = BTreeMap::new();
        for record in self.records_for(run_id).await? {
            if let Record::Event { event } = record {
                by_sequence.entry(event.sequence).or_insert(event);
            }
        }
        Ok(by_sequence.into_values().collect())
    }

    async fn latest_checkpoint(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError> {
        Ok(self
            .records_for(run_id)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Record::Checkpoint { snapshot } => Some(snapshot),
                _ => None,
            })
            .last())
    }

    async fn terminal(&self, run_id: RunId) -> Result<Option<TerminalRecord>, HistoryError> {
        Ok(self
            .records_for(run_id)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Record::Terminal { terminal } => Some(terminal),
                _ => None,
            })
            .last())
    }
}
