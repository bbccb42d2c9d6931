//! Assertions over run events and states.

use crate::context::PipelineState;
use crate::core::{EventKind, PipelineEvent, RunStatus, StageName, StageStatus};
use std::ops::Deref;

/// Asserts that sequence numbers strictly increase and progress never drops.
pub fn assert_ordered<E: Deref<Target = PipelineEvent>>(events: &[E]) {
    for pair in events.windows(2) {
        let (prev, next) = (&*pair[0], &*pair[1]);
        assert!(
            next.sequence > prev.sequence,
            "Sequence went from {} to {}",
            prev.sequence,
            next.sequence
        );
        assert!(
            next.progress >= prev.progress,
            "Progress dropped from {} to {} at sequence {} ({})",
            prev.progress,
            next.progress,
            next.sequence,
            next.message
        );
    }
}

/// Asserts exactly one `done` event, last in the list, at 100 %.
pub fn assert_single_done<E: Deref<Target = PipelineEvent>>(events: &[E]) {
    let done = events.iter().filter(|e| e.kind == EventKind::Done).count();
    assert_eq!(done, 1, "Expected exactly one done event, found {done}");

    let last = events.last().map(|e| &**e);
    assert!(
        last.is_some_and(|e| e.kind == EventKind::Done && e.progress == 100),
        "Expected the last event to be done at 100%, got {last:?}"
    );
}

/// Asserts the kinds of a list of events.
pub fn assert_kinds<E: Deref<Target = PipelineEvent>>(events: &[E], expected: &[EventKind]) {
    let actual: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(actual, expected, "Event kinds differ");
}

/// Asserts the stage order of the execution log.
pub fn assert_stage_sequence(state: &PipelineState, expected: &[StageName]) {
    assert_eq!(
        state.stage_sequence(),
        expected,
        "Execution log differs: {:?}",
        state
            .execution_log
            .iter()
            .map(|r| (r.stage, r.status))
            .collect::<Vec<_>>()
    );
}

/// Asserts the run status.
pub fn assert_status(state: &PipelineState, expected: RunStatus) {
    assert_eq!(
        state.status, expected,
        "Expected status {expected}, got {} (error: {:?})",
        state.status, state.terminal_error
    );
}

/// Asserts every logged stage succeeded.
pub fn assert_all_succeeded(state: &PipelineState) {
    let failed: Vec<_> = state
        .execution_log
        .iter()
        .filter(|r| r.status == StageStatus::Error)
        .map(|r| (r.stage, r.error.clone()))
        .collect();
    assert!(failed.is_empty(), "Stages failed: {failed:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RunId, RunInput};
    use crate::core::{StageOutput, StageResult};
    use chrono::Utc;
    use std::sync::Arc;

    fn event(sequence: u64, kind: EventKind, progress: u8) -> Arc<PipelineEvent> {
        Arc::new(PipelineEvent {
            run_id: RunId::new(),
            sequence,
            kind,
            stage: None,
            message: String::new(),
            progress,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        })
    }

    #[test]
    fn test_ordered_and_done() {
        let events = vec![
            event(1, EventKind::StageStarted, 5),
            event(2, EventKind::StageCompleted, 15),
            event(3, EventKind::Done, 100),
        ];
        assert_ordered(&events);
        assert_single_done(&events);
        assert_kinds(&events, &[EventKind::StageStarted, EventKind::StageCompleted, EventKind::Done]);
    }

    #[test]
    #[should_panic(expected = "Progress dropped")]
    fn test_ordered_catches_regression() {
        assert_ordered(&[event(1, EventKind::StageCompleted, 30), event(2, EventKind::StageStarted, 5)]);
    }

    #[test]
    #[should_panic(expected = "exactly one done")]
    fn test_single_done_catches_duplicates() {
        assert_single_done(&[event(1, EventKind::Done, 100), event(2, EventKind::Done, 100)]);
    }

    #[test]
    fn test_state_assertions() {
        let mut state = PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::Value::Null, 2);
        state.record(StageResult::success(StageName::Validate, StageOutput::new(), 1, 1, Utc::now()));
        assert_stage_sequence(&state, &[StageName::Validate]);
        assert_status(&state, RunStatus::Pending);
        assert_all_succeeded(&state);
    }
}
