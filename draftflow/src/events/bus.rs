//! Per-run event bus.
//!
//! The bus owns the ordered event log of one run. Every emitted event gets the
//! next sequence number and a progress value raised to the run's high-water
//! mark, is appended to the log, and is then handed to each subscriber in
//! registration order. Exactly one `done` event closes the bus; later
//! emissions are ignored.

use super::progress::{progress_for, started_progress};
use super::{EventSubscriber, SharedEvent};
use crate::context::RunId;
use crate::core::{EventDraft, EventKind, PipelineEvent, RunStatus, StageName, StageResult, StageStatus};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Latest outcome of one stage, as tracked by the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Final status of the latest invocation.
    pub status: StageStatus,
    /// One-line summary.
    pub summary: String,
    /// Elapsed time of the latest invocation.
    pub elapsed_ms: u64,
    /// Attempts of the latest invocation.
    pub attempts: u32,
    /// How many times the stage ran.
    pub invocations: u32,
}

/// Per-stage summaries plus the full event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// The run.
    pub run_id: RunId,
    /// Time since the bus was created.
    pub total_elapsed_ms: u64,
    /// Latest outcome per stage.
    pub stages: BTreeMap<StageName, StageSummary>,
    /// Every event emitted so far.
    pub events: Vec<PipelineEvent>,
}

#[derive(Default)]
struct BusState {
    sequence: u64,
    high_water: u8,
    done: bool,
    log: Vec<SharedEvent>,
    stages: BTreeMap<StageName, StageSummary>,
}

/// Ordered publish/subscribe channel for one run.
pub struct EventBus {
    run_id: RunId,
    created: Instant,
    state: Mutex<BusState>,
    subscribers: Mutex<Vec<Arc<dyn EventSubscriber>>>,
    delivery: tokio::sync::Mutex<()>,
}

impl EventBus {
    /// Creates a bus for a run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self::with_progress_floor(run_id, 0)
    }

    /// Creates a bus whose progress never drops below `floor`.
    ///
    /// Used when a run is resumed without its original bus.
    #[must_use]
    pub fn with_progress_floor(run_id: RunId, floor: u8) -> Self {
        Self::resume_from(run_id, floor, 0)
    }

    /// Creates a bus that continues a run whose earlier events went out on
    /// another bus.
    ///
    /// The first event gets sequence `sequence + 1` and progress is held at
    /// or above `floor`.
    #[must_use]
    pub fn resume_from(run_id: RunId, floor: u8, sequence: u64) -> Self {
        Self {
            run_id,
            created: Instant::now(),
            state: Mutex::new(BusState {
                sequence,
                high_water: floor.min(100),
                ..BusState::default()
            }),
            subscribers: Mutex::new(Vec::new()),
            delivery: tokio::sync::Mutex::new(()),
        }
    }

    /// The run this bus belongs to.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Registers a subscriber for all later events.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        debug!(run_id = %self.run_id, subscriber = subscriber.name(), "Subscriber attached");
        self.subscribers.lock().push(subscriber);
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Current progress high-water mark.
    #[must_use]
    pub fn progress(&self) -> u8 {
        self.state.lock().high_water
    }

    /// Sequence number of the last emitted event, 0 before the first.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    /// Returns true once `done` was emitted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Snapshot of the event log.
    #[must_use]
    pub fn events(&self) -> Vec<SharedEvent> {
        self.state.lock().log.clone()
    }

    /// Emits an event and delivers it to every subscriber.
    ///
    /// Returns `None` without doing anything once `done` was emitted.
    pub async fn emit(&self, draft: EventDraft) -> Option<SharedEvent> {
        let _delivery = self.delivery.lock().await;

        let event = {
            let mut state = self.state.lock();
            if state.done {
                debug!(
                    run_id = %self.run_id,
                    kind = %draft.kind,
                    "Bus closed, event ignored"
                );
                return None;
            }

            let progress = if draft.kind == EventKind::Done {
                100
            } else {
                draft.progress.min(100).max(state.high_water)
            };
            state.high_water = progress;
            state.sequence += 1;
            state.done = draft.kind == EventKind::Done;

            let event = Arc::new(PipelineEvent {
                run_id: self.run_id,
                sequence: state.sequence,
                kind: draft.kind,
                stage: draft.stage,
                message: draft.message,
                progress,
                timestamp: Utc::now(),
                payload: draft.payload,
            });
            state.log.push(Arc::clone(&event));
            event
        };

        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            let delivery = AssertUnwindSafe(subscriber.on_event(Arc::clone(&event))).catch_unwind();
            match delivery.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    run_id = %self.run_id,
                    sequence = event.sequence,
                    error = %err,
                    "Subscriber failed"
                ),
                Err(_) => error!(
                    run_id = %self.run_id,
                    sequence = event.sequence,
                    subscriber = subscriber.name(),
                    "Subscriber panicked"
                ),
            }
        }

        Some(event)
    }

    /// Emits `stageStarted`.
    pub async fn stage_started(&self, stage: StageName) -> Option<SharedEvent> {
        self.emit(
            EventDraft::new(
                EventKind::StageStarted,
                format!("{} stage started", stage.label()),
                started_progress(stage),
            )
            .with_stage(stage),
        )
        .await
    }

    /// Emits `stageCompleted` or `stageFailed` for a result.
    pub async fn stage_finished(&self, result: &StageResult) -> Option<SharedEvent> {
        self.track(result);

        let draft = match result.status {
            StageStatus::Success => EventDraft::new(
                EventKind::StageCompleted,
                format!("{} completed in {}ms", result.stage.label(), result.elapsed_ms),
                progress_for(result.stage),
            )
            .with_payload(serde_json::json!({
                "summary": result.summary,
                "decision": result.output.decision(),
                "score": result.output.quality_score(),
                "elapsed_ms": result.elapsed_ms,
                "attempts": result.attempts,
                "output": result.output,
            })),
            StageStatus::Error => EventDraft::new(
                EventKind::StageFailed,
                format!(
                    "{} failed after {} attempt(s): {}",
                    result.stage.label(),
                    result.attempts,
                    result.error.as_deref().unwrap_or("unknown error")
                ),
                0,
            )
            .with_payload(serde_json::json!({
                "error": result.error,
                "elapsed_ms": result.elapsed_ms,
                "attempts": result.attempts,
            })),
        };

        self.emit(draft.with_stage(result.stage)).await
    }

    /// Emits `statusChanged`.
    pub async fn status_changed(
        &self,
        status: RunStatus,
        message: impl Into<String>,
    ) -> Option<SharedEvent> {
        self.emit(
            EventDraft::new(EventKind::StatusChanged, message, 0)
                .with_payload(serde_json::json!({ "status": status })),
        )
        .await
    }

    /// Emits the single terminal `done` event.
    pub async fn done(
        &self,
        status: RunStatus,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Option<SharedEvent> {
        let payload = match payload {
            serde_json::Value::Object(mut map) => {
                map.insert("status".to_string(), serde_json::json!(status));
                serde_json::Value::Object(map)
            }
            serde_json::Value::Null => serde_json::json!({ "status": status }),
            other => serde_json::json!({ "status": status, "data": other }),
        };
        self.emit(EventDraft::new(EventKind::Done, message, 100).with_payload(payload))
            .await
    }

    /// Per-stage summaries plus every event so far.
    #[must_use]
    pub fn execution_summary(&self) -> ExecutionSummary {
        let state = self.state.lock();
        ExecutionSummary {
            run_id: self.run_id,
            total_elapsed_ms: u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX),
            stages: state.stages.clone(),
            events: state.log.iter().map(|e| e.as_ref().clone()).collect(),
        }
    }

    fn track(&self, result: &StageResult) {
        let mut state = self.state.lock();
        let invocations = state.stages.get(&result.stage).map_or(0, |s| s.invocations) + 1;
        state.stages.insert(
            result.stage,
            StageSummary {
                status: result.status,
                summary: result.summary.clone(),
                elapsed_ms: result.elapsed_ms,
                attempts: result.attempts,
                invocations,
            },
        );
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("run_id", &self.run_id)
            .field("progress", &self.progress())
            .field("done", &self.is_done())
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageOutput;
    use crate::errors::SubscriberError;
    use crate::events::{CollectingSubscriber, FnSubscriber};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FailingSubscriber;

    #[async_trait]
    impl EventSubscriber for FailingSubscriber {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_event(&self, _event: SharedEvent) -> Result<(), SubscriberError> {
            Err(SubscriberError::new("failing", "socket closed"))
        }
    }

    fn success(stage: StageName) -> StageResult {
        StageResult::success(stage, StageOutput::new().with("decision", "approve"), 1, 3, Utc::now())
            .with_summary("ok")
    }

    #[tokio::test]
    async fn test_sequence_and_log() {
        let bus = EventBus::new(RunId::new());
        bus.stage_started(StageName::Validate).await;
        bus.stage_finished(&success(StageName::Validate)).await;

        let events = bus.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[0].progress, 5);
        assert_eq!(events[1].progress, 15);
        assert_eq!(events[1].payload["summary"], "ok");
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let bus = EventBus::new(RunId::new());
        bus.stage_finished(&success(StageName::Optimize)).await;
        bus.stage_started(StageName::Write).await;
        bus.status_changed(RunStatus::Processing, "revising").await;

        let progress: Vec<u8> = bus.events().iter().map(|e| e.progress).collect();
        assert_eq!(progress, vec![90, 90, 90]);
    }

    #[tokio::test]
    async fn test_progress_floor() {
        let bus = EventBus::with_progress_floor(RunId::new(), 30);
        bus.stage_started(StageName::Write).await;
        bus.stage_started(StageName::Validate).await;
        assert_eq!(bus.progress(), 45);
        assert_eq!(bus.events()[1].progress, 45);
    }

    #[tokio::test]
    async fn test_resume_from_continues_sequence() {
        let bus = EventBus::resume_from(RunId::new(), 30, 6);
        assert_eq!(bus.sequence(), 6);

        bus.stage_started(StageName::Write).await;
        bus.stage_started(StageName::Optimize).await;
        let sequences: Vec<u64> = bus.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![7, 8]);
        assert_eq!(bus.sequence(), 8);
        assert!(bus.events()[0].progress >= 30);
    }

    #[tokio::test]
    async fn test_single_done_closes_bus() {
        let bus = EventBus::new(RunId::new());
        let collector = CollectingSubscriber::new();
        bus.subscribe(Arc::new(collector.clone()));

        assert!(bus.done(RunStatus::Completed, "finished", serde_json::Value::Null).await.is_some());
        assert!(bus.done(RunStatus::Completed, "again", serde_json::Value::Null).await.is_none());
        assert!(bus.stage_started(StageName::Write).await.is_none());

        let events = collector.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].progress, 100);
        assert_eq!(events[0].payload["status"], "completed");
        assert!(bus.is_done());
    }

    #[tokio::test]
    async fn test_failing_and_panicking_subscribers_are_isolated() {
        let bus = EventBus::new(RunId::new());
        let collector = CollectingSubscriber::new();
        bus.subscribe(Arc::new(FailingSubscriber));
        bus.subscribe(Arc::new(FnSubscriber::new("panics", |_e| panic!("subscriber bug"))));
        bus.subscribe(Arc::new(collector.clone()));

        bus.stage_started(StageName::Validate).await;
        bus.stage_started(StageName::Strategize).await;

        assert_eq!(collector.len(), 2);
        assert_eq!(bus.events().len(), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_events() {
        let bus = EventBus::new(RunId::new());
        bus.stage_started(StageName::Validate).await;

        let collector = CollectingSubscriber::new();
        bus.subscribe(Arc::new(collector.clone()));
        bus.stage_finished(&success(StageName::Validate)).await;

        assert_eq!(collector.len(), 1);
        assert_eq!(collector.events()[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_failed_stage_event() {
        let bus = EventBus::new(RunId::new());
        bus.stage_started(StageName::Write).await;
        let failed = StageResult::failure(StageName::Write, "timeout", 3, 10, Utc::now());
        let event = bus.stage_finished(&failed).await.unwrap();

        assert_eq!(event.kind, EventKind::StageFailed);
        assert_eq!(event.progress, 45);
        assert_eq!(event.payload["attempts"], 3);
        assert!(event.message.contains("timeout"));
    }

    #[tokio::test]
    async fn test_execution_summary_counts_invocations() {
        let bus = EventBus::new(RunId::new());
        bus.stage_finished(&success(StageName::Write)).await;
        bus.stage_finished(&success(StageName::Write)).await;

        let summary = bus.execution_summary();
        assert_eq!(summary.stages[&StageName::Write].invocations, 2);
        assert_eq!(summary.events.len(), 2);
    }
}
