//! Record of one stage invocation.

use super::{StageName, StageOutput, StageStatus};
use crate::errors::StageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one stage invocation, retries folded in.
///
/// Appended to the execution log and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage that ran.
    pub stage: StageName,
    /// Final status after all attempts.
    pub status: StageStatus,
    /// Output of the successful attempt; empty on error.
    #[serde(default)]
    pub output: StageOutput,
    /// Wall time across all attempts, backoff included.
    pub elapsed_ms: u64,
    /// Number of attempts made (1-based).
    pub attempts: u32,
    /// Last error description, set only on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Short human-readable summary of the output.
    #[serde(default)]
    pub summary: String,
    /// When the first attempt started.
    pub started_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage: StageName,
        output: StageOutput,
        attempts: u32,
        elapsed_ms: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            output,
            elapsed_ms,
            attempts,
            error: None,
            summary: String::new(),
            started_at,
        }
    }

    /// Creates a failed result with an empty output.
    #[must_use]
    pub fn failure(
        stage: StageName,
        error: impl Into<String>,
        attempts: u32,
        elapsed_ms: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Error,
            output: StageOutput::default(),
            elapsed_ms,
            attempts,
            error: Some(error.into()),
            summary: String::new(),
            started_at,
        }
    }

    /// Attaches a summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }

    /// Returns the failure as a typed error, if any.
    #[must_use]
    pub fn to_error(&self) -> Option<StageError> {
        match self.status {
            StageStatus::Success => None,
            StageStatus::Error => Some(StageError::new(
                self.stage,
                self.error.clone().unwrap_or_default(),
                self.attempts,
            )),
        }
    }
}
