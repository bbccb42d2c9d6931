//! Keyed store for runs suspended at the pause point.

use crate::context::{RunId, RunSnapshot};
use crate::errors::HistoryError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Holds suspended runs between `start` and `resume`.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Saves or replaces the snapshot of a run.
    async fn save(&self, snapshot: RunSnapshot) -> Result<(), HistoryError>;

    /// Loads the snapshot of a run.
    async fn load(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError>;

    /// Removes and returns the snapshot of a run.
    async fn remove(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError>;
}

/// Run store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: DashMap<RunId, RunSnapshot>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of suspended runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no run is suspended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, snapshot: RunSnapshot) -> Result<(), HistoryError> {
        self.runs.insert(snapshot.run_id(), snapshot);
        Ok(())
    }

    async fn load(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError> {
        Ok(self.runs.get(&run_id).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, run_id: RunId) -> Result<Option<RunSnapshot>, HistoryError> {
        Ok(self.runs.remove(&run_id).map(|(_, snapshot)| snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineState, RunInput};

    #[tokio::test]
    async fn test_save_load_remove() {
        let store = InMemoryRunStore::new();
        let run_id = RunId::new();
        let state = PipelineState::new(run_id, RunInput::new("idea"), serde_json::Value::Null, 2);

        store.save(RunSnapshot::capture(&state).unwrap()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(run_id).await.unwrap().unwrap().state, state);

        assert!(store.remove(run_id).await.unwrap().is_some());
        assert!(store.load(run_id).await.unwrap().is_none());
        assert!(store.remove(run_id).await.unwrap().is_none());
        assert!(store.is_empty());
    }
}
