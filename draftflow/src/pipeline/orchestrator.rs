//! Run orchestration.
//!
//! The orchestrator drives one run at a time per task through the fixed stage
//! graph. `start` runs validate and strategize, then suspends and hands the
//! state back. `resume` picks the same state up with the author's answers and
//! carries it to a terminal status.
//!
//! Per-run live resources (event bus and cancellation token) sit in a registry
//! owned by the orchestrator and are dropped when the run ends. Suspended
//! states are also saved to a [`RunStore`]. A resume has to claim the stored
//! entry, so each suspension is resumed at most once.

use super::finalize::assemble;
use super::graph::{next_after, Transition, ENTRY, RESUME_ENTRY};
use super::StageRunner;
use crate::cancellation::CancellationToken;
use crate::config::{EngineConfig, FailurePolicy};
use crate::context::{ExternalAnswers, PipelineState, RunId, RunInput, RunSnapshot, StageInput};
use crate::core::{keys, PostFormat, RunStatus, StageName, StageResult};
use crate::errors::{DraftflowError, InvalidStateError, InvalidStateKind};
use crate::events::{progress_for, ChannelSubscriber, EventBus, EventSubscriber, ExecutionSummary, SharedEvent};
use crate::history::{HistoryRecorder, HistorySubscriber, InMemoryRunStore, NoOpHistoryRecorder, RunStore};
use crate::stages::StageSet;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

struct RunHandle {
    bus: EventBus,
    cancel: CancellationToken,
}

/// Drives runs through the stage graph.
pub struct Orchestrator {
    stages: StageSet,
    config: EngineConfig,
    runner: StageRunner,
    recorder: Arc<dyn HistoryRecorder>,
    store: Arc<dyn RunStore>,
    live: DashMap<RunId, Arc<RunHandle>>,
}

impl Orchestrator {
    /// Creates an orchestrator with no history and an in-memory run store.
    #[must_use]
    pub fn new(stages: StageSet, config: EngineConfig) -> Self {
        let runner = StageRunner::new(config.retry.clone());
        Self {
            stages,
            config,
            runner,
            recorder: Arc::new(NoOpHistoryRecorder),
            store: Arc::new(InMemoryRunStore::new()),
            live: DashMap::new(),
        }
    }

    /// Sets the history recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn HistoryRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Sets the store for suspended runs.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = store;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of runs with live resources.
    #[must_use]
    pub fn live_runs(&self) -> usize {
        self.live.len()
    }

    /// Registers a subscriber for every later event of a run.
    ///
    /// May be called before `start` so the subscriber sees the whole run.
    pub fn subscribe(&self, run_id: RunId, subscriber: Arc<dyn EventSubscriber>) {
        self.handle(run_id, 0, 0).bus.subscribe(subscriber);
    }

    /// Drops the live resources of a run that has not emitted anything yet,
    /// such as one that was subscribed to but never started.
    ///
    /// Returns false if the run is unknown or already under way.
    pub fn release(&self, run_id: RunId) -> bool {
        let released = self
            .live
            .remove_if(&run_id, |_, handle| handle.bus.sequence() == 0)
            .is_some();
        if released {
            debug!(%run_id, "Idle run handle released");
        }
        released
    }

    /// Subscribes a bounded channel to a run and returns its receiving end.
    ///
    /// Events that do not fit in the channel are dropped.
    pub fn subscribe_channel(&self, run_id: RunId) -> mpsc::Receiver<SharedEvent> {
        let (subscriber, rx) = ChannelSubscriber::new("channel", self.config.event_channel_capacity);
        self.subscribe(run_id, Arc::new(subscriber));
        rx
    }

    /// Per-stage summaries and events of a live run.
    #[must_use]
    pub fn execution_summary(&self, run_id: RunId) -> Option<ExecutionSummary> {
        self.live
            .get(&run_id)
            .map(|handle| handle.bus.execution_summary())
    }

    /// Requests cancellation of a run.
    ///
    /// A running run stops before its next stage. A run suspended at the
    /// pause point ends immediately. Returns false if the run is unknown.
    pub async fn cancel(&self, run_id: RunId, reason: impl Into<String>) -> bool {
        let reason = reason.into();

        let existing = self.live.get(&run_id).map(|h| Arc::clone(h.value()));
        let handle = match existing {
            Some(handle) => handle,
            None => match self.store.load(run_id).await {
                Ok(Some(snapshot)) => self.handle(
                    run_id,
                    progress_for(StageName::Strategize),
                    snapshot.state.last_sequence,
                ),
                Ok(None) => {
                    debug!(%run_id, "Cancel requested for unknown run");
                    return false;
                }
                Err(err) => {
                    warn!(%run_id, error = %err, "Run store lookup failed");
                    return false;
                }
            },
        };

        info!(%run_id, reason = %reason, "Cancelling run");
        handle.cancel.cancel(reason.as_str());

        let suspended = match self.store.remove(run_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%run_id, error = %err, "Run store remove failed");
                None
            }
        };

        if let Some(snapshot) = suspended {
            match snapshot.verify() {
                Ok(state) if state.status == RunStatus::AwaitingExternalInput => {
                    self.cancel_run(state, &handle).await;
                }
                Ok(state) => debug!(%run_id, status = %state.status, "Stored run is not suspended"),
                Err(err) => warn!(%run_id, error = %err, "Stored snapshot unusable"),
            }
        }
        true
    }

    /// Starts a run and drives it up to the pause point.
    ///
    /// Returns the state suspended in `awaitingExternalInput`, or a terminal
    /// state if the idea was rejected, the run failed, or it was cancelled.
    pub async fn start(
        &self,
        run_id: RunId,
        input: RunInput,
        external_context: serde_json::Value,
    ) -> PipelineState {
        let mut state = PipelineState::new(run_id, input, external_context, self.config.max_revisions);
        let handle = self.handle(run_id, 0, 0);

        info!(%run_id, max_revisions = state.max_revisions, "Run started");
        set_status(&mut state, RunStatus::Processing);
        handle.bus.status_changed(RunStatus::Processing, "Run started").await;

        self.drive(state, ENTRY, &handle).await
    }

    /// Resumes a suspended run with the author's answers.
    ///
    /// # Errors
    ///
    /// Returns `RunMismatch` if the state belongs to another run and
    /// `AlreadyTerminal` if history shows the run already ended; neither
    /// touches the run. If the state is not suspended, is past its revision
    /// ceiling, or already has answers, the run is recorded as failed. If the
    /// run is not suspended in the run store, for example because it was
    /// resumed or cancelled already, `UnknownRun` is returned.
    pub async fn resume(
        &self,
        run_id: RunId,
        mut state: PipelineState,
        answers: ExternalAnswers,
    ) -> Result<PipelineState, InvalidStateError> {
        if state.run_id != run_id {
            warn!(%run_id, state_run_id = %state.run_id, "Resume refused, state belongs to another run");
            return Err(InvalidStateError::new(
                run_id,
                InvalidStateKind::RunMismatch,
                format!("state belongs to run {}", state.run_id),
            )
            .with_status(state.status));
        }
        if let Some(err) = self.ended(run_id).await {
            warn!(%run_id, kind = %err.kind, "Resume refused, run already ended");
            return Err(err);
        }
        if let Err(err) = admit(&mut state, run_id, answers) {
            self.refuse(run_id, &state, &err).await;
            return Err(err);
        }
        if !self.claim(run_id).await {
            warn!(%run_id, "Resume refused, run is not suspended");
            return Err(InvalidStateError::new(
                run_id,
                InvalidStateKind::UnknownRun,
                "no suspended run to resume under this id",
            ));
        }

        let missing: Vec<&str> = state
            .unanswered_required()
            .iter()
            .map(|q| q.question_id.as_str())
            .collect();
        if !missing.is_empty() {
            warn!(%run_id, missing = ?missing, "Required questions left unanswered");
        }

        let handle = self.handle(run_id, progress_for(StageName::Strategize), state.last_sequence);
        info!(%run_id, answers = state.external_answers.as_ref().map_or(0, ExternalAnswers::len), "Run resumed");
        handle.bus.status_changed(RunStatus::Processing, "Run resumed").await;

        Ok(self.drive(state, RESUME_ENTRY, &handle).await)
    }

    /// Resumes a run from the run store.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRun` if nothing is stored under `run_id`,
    /// `CorruptSnapshot` if the stored copy fails its integrity check, and
    /// otherwise whatever [`Orchestrator::resume`] returns.
    pub async fn resume_stored(
        &self,
        run_id: RunId,
        answers: ExternalAnswers,
    ) -> Result<PipelineState, InvalidStateError> {
        let snapshot = match self.store.load(run_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return Err(InvalidStateError::new(
                    run_id,
                    InvalidStateKind::UnknownRun,
                    "no suspended run stored under this id",
                ));
            }
            Err(err) => {
                return Err(InvalidStateError::new(
                    run_id,
                    InvalidStateKind::UnknownRun,
                    format!("run store unavailable: {err}"),
                ));
            }
        };

        let state = snapshot.verify().map_err(|err| match err {
            DraftflowError::InvalidState(inner) => inner,
            other => InvalidStateError::new(run_id, InvalidStateKind::CorruptSnapshot, other.to_string()),
        })?;

        self.resume(run_id, state, answers).await
    }

    async fn drive(&self, mut state: PipelineState, entry: StageName, handle: &RunHandle) -> PipelineState {
        let run_id = state.run_id;
        let mut next = entry;

        loop {
            if handle.cancel.is_cancelled() {
                return self.cancel_run(state, handle).await;
            }

            let Some(stage) = self.stages.get(next).map(Arc::clone) else {
                return self.finalize(state, handle).await;
            };

            state.begin_stage(next);
            let input = StageInput::for_stage(next, &state);
            let result = self
                .runner
                .run(next, stage.as_ref(), &input, &handle.bus, &handle.cancel)
                .await;

            if next == StageName::Strategize {
                apply_strategy(&mut state, &result);
            }
            let transition = next_after(&result, &state);
            let failure = result.to_error();
            state.record(result);

            if let Some(failure) = failure {
                if self.config.failure_policy == FailurePolicy::Halt {
                    error!(%run_id, stage = %next, error = %failure, "Stage failed, halting run");
                    state.fail(failure.to_string());
                    let payload = serde_json::json!({ "error": state.terminal_error, "stage": next });
                    return self.conclude(state, handle, "Run failed", payload).await;
                }
                warn!(%run_id, stage = %next, error = %failure, "Stage failed, continuing");
            }

            if next == StageName::Validate {
                self.checkpoint(&mut state, &handle.bus).await;
            }

            match transition {
                Transition::Run(StageName::Write) if next == StageName::Optimize => {
                    state.increment_revision();
                    let message = format!("Revision {}/{}", state.revision_count, state.max_revisions);
                    info!(%run_id, revision = state.revision_count, "Revising draft");
                    handle.bus.status_changed(RunStatus::Processing, message).await;
                    next = StageName::Write;
                }
                Transition::Run(stage) => next = stage,
                Transition::Pause => return self.pause(state, handle).await,
                Transition::Reject => return self.reject(state, handle).await,
            }
        }
    }

    async fn pause(&self, mut state: PipelineState, handle: &RunHandle) -> PipelineState {
        let run_id = state.run_id;
        set_status(&mut state, RunStatus::AwaitingExternalInput);

        let questions = state.pending_questions.len();
        info!(%run_id, questions, format = %state.format, "Run suspended for answers");
        handle
            .bus
            .status_changed(
                RunStatus::AwaitingExternalInput,
                format!("Awaiting answers to {questions} question(s)"),
            )
            .await;

        if let Some(snapshot) = self.checkpoint(&mut state, &handle.bus).await {
            if let Err(err) = self.store.save(snapshot).await {
                warn!(%run_id, error = %err, "Run store save failed");
            }
        }
        state
    }

    async fn reject(&self, mut state: PipelineState, handle: &RunHandle) -> PipelineState {
        set_status(&mut state, RunStatus::Rejected);
        let validate = state.output(StageName::Validate);
        let payload = serde_json::json!({
            "quality_score": validate.and_then(|o| o.quality_score()),
            "reasoning": validate.and_then(|o| o.get_str(keys::REASONING)),
            "suggestions": validate.map(|o| o.get_strings(keys::REFINEMENT_SUGGESTIONS)).unwrap_or_default(),
        });
        self.conclude(state, handle, "Idea rejected", payload).await
    }

    async fn finalize(&self, mut state: PipelineState, handle: &RunHandle) -> PipelineState {
        state.begin_stage(StageName::Finalize);
        let post = assemble(&state);
        let payload = serde_json::json!({
            "final_post": serde_json::to_value(&post).unwrap_or_default(),
            "revision_count": state.revision_count,
        });
        state.final_post = Some(post);
        set_status(&mut state, RunStatus::Completed);
        self.conclude(state, handle, "Post ready", payload).await
    }

    async fn cancel_run(&self, mut state: PipelineState, handle: &RunHandle) -> PipelineState {
        if !state.is_terminal() {
            set_status(&mut state, RunStatus::Cancelled);
        }
        let reason = handle.cancel.reason().unwrap_or_default();
        let payload = serde_json::json!({ "reason": reason });
        self.conclude(state, handle, format!("Run cancelled: {reason}"), payload)
            .await
    }

    async fn conclude(
        &self,
        mut state: PipelineState,
        handle: &RunHandle,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> PipelineState {
        let run_id = state.run_id;
        let message = message.into();
        info!(
            %run_id,
            status = %state.status,
            stages_run = state.execution_log.len(),
            revisions = state.revision_count,
            "Run finished"
        );

        handle.bus.status_changed(state.status, message.clone()).await;
        handle.bus.done(state.status, message, payload).await;

        self.checkpoint(&mut state, &handle.bus).await;
        self.mark_terminal(run_id, state.status, state.terminal_error.clone())
            .await;
        if let Err(err) = self.store.remove(run_id).await {
            warn!(%run_id, error = %err, "Run store remove failed");
        }
        self.live.remove(&run_id);
        state
    }

    async fn refuse(&self, run_id: RunId, state: &PipelineState, err: &InvalidStateError) {
        warn!(%run_id, kind = %err.kind, error = %err, "Resume refused");
        // Only a live state of this very run is torn down.
        if state.is_terminal() || state.run_id != run_id {
            return;
        }

        let handle = self.live.get(&run_id).map(|h| Arc::clone(h.value()));
        if let Some(handle) = handle {
            handle
                .bus
                .done(RunStatus::Failed, err.to_string(), serde_json::json!({ "error": err.to_dict() }))
                .await;
            self.live.remove(&run_id);
        }
        self.mark_terminal(run_id, RunStatus::Failed, Some(err.to_string()))
            .await;
        if let Err(store_err) = self.store.remove(run_id).await {
            warn!(%run_id, error = %store_err, "Run store remove failed");
        }
    }

    /// Records a checkpoint; the state first takes the bus's last sequence so
    /// a later bus for the same run continues after it.
    async fn checkpoint(&self, state: &mut PipelineState, bus: &EventBus) -> Option<RunSnapshot> {
        let run_id = state.run_id;
        state.last_sequence = bus.sequence();
        let snapshot = match RunSnapshot::capture(state) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(%run_id, error = %err, "Snapshot capture failed");
                return None;
            }
        };
        if let Err(err) = self.recorder.checkpoint(run_id, &snapshot).await {
            warn!(%run_id, error = %err, "Checkpoint write failed");
        }
        Some(snapshot)
    }

    async fn mark_terminal(&self, run_id: RunId, status: RunStatus, detail: Option<String>) {
        if let Err(err) = self.recorder.mark_terminal(run_id, status, detail).await {
            warn!(%run_id, error = %err, "Terminal marker write failed");
        }
    }

    /// The refusal to return when history holds a terminal record for the run.
    async fn ended(&self, run_id: RunId) -> Option<InvalidStateError> {
        match self.recorder.terminal(run_id).await {
            Ok(Some(record)) => Some(
                InvalidStateError::new(
                    run_id,
                    InvalidStateKind::AlreadyTerminal,
                    format!("run already ended as {}", record.status),
                )
                .with_status(record.status),
            ),
            Ok(None) => None,
            Err(err) => {
                warn!(%run_id, error = %err, "Terminal lookup failed");
                None
            }
        }
    }

    /// Takes the suspended entry out of the run store. Only one caller wins.
    async fn claim(&self, run_id: RunId) -> bool {
        match self.store.remove(run_id).await {
            Ok(claimed) => claimed.is_some(),
            Err(err) => {
                warn!(%run_id, error = %err, "Run store remove failed");
                false
            }
        }
    }

    fn handle(&self, run_id: RunId, progress_floor: u8, sequence: u64) -> Arc<RunHandle> {
        let entry = self.live.entry(run_id).or_insert_with(|| {
            let bus = EventBus::resume_from(run_id, progress_floor, sequence);
            bus.subscribe(Arc::new(HistorySubscriber::new(Arc::clone(&self.recorder))));
            Arc::new(RunHandle {
                bus,
                cancel: CancellationToken::new(),
            })
        });
        Arc::clone(entry.value())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("stages", &self.stages)
            .field("config", &self.config)
            .field("live_runs", &self.live.len())
            .finish_non_exhaustive()
    }
}

fn admit(state: &mut PipelineState, run_id: RunId, answers: ExternalAnswers) -> Result<(), InvalidStateError> {
    state.check_resumable(run_id)?;
    state.set_external_answers(answers)?;
    state.transition(RunStatus::Processing)
}

/// Stores the format and questions chosen by strategize.
///
/// The format falls back to the author's preference, then to text.
fn apply_strategy(state: &mut PipelineState, result: &StageResult) {
    let recommended = if result.is_success() {
        result.output.recommended_format()
    } else {
        None
    };
    state.format = recommended
        .or(state.input.preferred_format)
        .unwrap_or(PostFormat::Text);

    if result.is_success() {
        state.set_pending_questions(result.output.clarifying_questions());
    }
}

fn set_status(state: &mut PipelineState, status: RunStatus) {
    if let Err(err) = state.transition(status) {
        error!(run_id = %state.run_id, error = %err, "Status change refused");
    }
}
