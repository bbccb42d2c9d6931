//! Fingerprinted snapshots of a run state.
//!
//! Snapshots are what checkpoints and the run store persist. The fingerprint
//! is a SHA-256 over the canonical JSON encoding of the state; object keys are
//! sorted, so equal states always hash the same.

use super::{PipelineState, RunId};
use crate::errors::{DraftflowError, InvalidStateError, InvalidStateKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A persisted copy of a state with an integrity fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// The captured state.
    pub state: PipelineState,
    /// Hex SHA-256 of the encoded state.
    pub fingerprint: String,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl RunSnapshot {
    /// Captures a snapshot of `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be encoded.
    pub fn capture(state: &PipelineState) -> Result<Self, DraftflowError> {
        Ok(Self {
            fingerprint: fingerprint(state)?,
            state: state.clone(),
            taken_at: Utc::now(),
        })
    }

    /// Run the snapshot belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.state.run_id
    }

    /// Checks the fingerprint and returns the state.
    ///
    /// # Errors
    ///
    /// Returns `CorruptSnapshot` if the state no longer matches its fingerprint.
    pub fn verify(self) -> Result<PipelineState, DraftflowError> {
        let actual = fingerprint(&self.state)?;
        if actual != self.fingerprint {
            return Err(InvalidStateError::new(
                self.state.run_id,
                InvalidStateKind::CorruptSnapshot,
                format!("fingerprint mismatch: expected {}, got {actual}", self.fingerprint),
            )
            .with_status(self.state.status)
            .into());
        }
        Ok(self.state)
    }
}

fn fingerprint(state: &PipelineState) -> Result<String, DraftflowError> {
    let bytes = serde_json::to_vec(state)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
