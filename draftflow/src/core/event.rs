//! Pipeline events streamed to subscribers and recorded in history.

use super::StageName;
use crate::context::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A stage is about to run.
    StageStarted,
    /// A stage succeeded.
    StageCompleted,
    /// A stage failed after all retries.
    StageFailed,
    /// The run status changed.
    StatusChanged,
    /// The run reached a terminal status. Always the last event.
    Done,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageStarted => write!(f, "stageStarted"),
            Self::StageCompleted => write!(f, "stageCompleted"),
            Self::StageFailed => write!(f, "stageFailed"),
            Self::StatusChanged => write!(f, "statusChanged"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// One immutable event of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Per-run sequence number, starting at 1.
    pub sequence: u64,
    /// Event kind.
    pub kind: EventKind,
    /// Stage the event refers to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    /// Human-readable message.
    pub message: String,
    /// Progress percentage, never decreasing within a run.
    pub progress: u8,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Free-form payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PipelineEvent {
    /// Returns true for the terminal `done` event.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.kind == EventKind::Done
    }
}

/// An event before the bus assigns sequence, progress clamp and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    /// Event kind.
    pub kind: EventKind,
    /// Stage the event refers to.
    pub stage: Option<StageName>,
    /// Human-readable message.
    pub message: String,
    /// Requested progress; the bus raises it to the high-water mark.
    pub progress: u8,
    /// Free-form payload.
    pub payload: serde_json::Value,
}

impl EventDraft {
    /// Creates a draft with a null payload.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>, progress: u8) -> Self {
        Self {
            kind,
            stage: None,
            message: message.into(),
            progress,
            payload: serde_json::Value::Null,
        }
    }

    /// Sets the stage.
    #[must_use]
    pub const fn with_stage(mut self, stage: StageName) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_serialize() {
        let json = serde_json::to_string(&EventKind::StageCompleted).unwrap();
        assert_eq!(json, r#""stageCompleted""#);
        assert_eq!(EventKind::Done.to_string(), "done");
    }

    #[test]
    fn test_draft_builder() {
        let draft = EventDraft::new(EventKind::StageStarted, "Starting write", 45)
            .with_stage(StageName::Write)
            .with_payload(serde_json::json!({"attempt": 1}));

        assert_eq!(draft.stage, Some(StageName::Write));
        assert_eq!(draft.progress, 45);
        assert_eq!(draft.payload["attempt"], 1);
    }

    #[test]
    fn test_event_roundtrip_omits_missing_stage() {
        let event = PipelineEvent {
            run_id: RunId::new(),
            sequence: 7,
            kind: EventKind::Done,
            stage: None,
            message: "Pipeline completed".to_string(),
            progress: 100,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("stage").is_none());
        assert!(event.is_done());
    }
}
