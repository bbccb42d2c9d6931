//! The mutable context of one run.

use super::RunId;
use crate::core::{
    ClarifyingQuestion, FinalPost, PostFormat, RunStatus, StageName, StageOutput, StageResult,
};
use crate::errors::{InvalidStateError, InvalidStateKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answers keyed by question id.
pub type ExternalAnswers = BTreeMap<String, String>;

/// The original request of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    /// Raw idea text.
    pub idea: String,
    /// Format the author would like, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_format: Option<PostFormat>,
    /// Content pillar the idea belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_pillar: Option<String>,
}

impl RunInput {
    /// Creates an input from idea text.
    #[must_use]
    pub fn new(idea: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            ..Default::default()
        }
    }

    /// Sets the preferred format.
    #[must_use]
    pub const fn with_preferred_format(mut self, format: PostFormat) -> Self {
        self.preferred_format = Some(format);
        self
    }

    /// Sets the content pillar.
    #[must_use]
    pub fn with_content_pillar(mut self, pillar: impl Into<String>) -> Self {
        self.content_pillar = Some(pillar.into());
        self
    }
}

/// Everything the engine knows about a run.
///
/// Invariants:
/// - `0 <= revision_count <= max_revisions`
/// - `terminal_error` is set iff `status == Failed`
/// - `execution_log` and `stage_outputs` only grow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// The run this state belongs to.
    pub run_id: RunId,
    /// Original request.
    pub input: RunInput,
    /// Caller-supplied profile snapshot.
    #[serde(default)]
    pub external_context: serde_json::Value,
    /// Latest successful output per stage.
    #[serde(default)]
    pub stage_outputs: BTreeMap<StageName, StageOutput>,
    /// Format chosen by strategize.
    #[serde(default)]
    pub format: PostFormat,
    /// Questions emitted before the pause.
    #[serde(default)]
    pub pending_questions: Vec<ClarifyingQuestion>,
    /// Answers supplied at resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_answers: Option<ExternalAnswers>,
    /// Most recently started stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageName>,
    /// Run status.
    pub status: RunStatus,
    /// Completed revision loops.
    pub revision_count: u32,
    /// Ceiling on revision loops, fixed at start.
    pub max_revisions: u32,
    /// One entry per stage invocation.
    #[serde(default)]
    pub execution_log: Vec<StageResult>,
    /// Sequence of the last event emitted for the run.
    #[serde(default)]
    pub last_sequence: u64,
    /// Failure detail when status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_error: Option<String>,
    /// Assembled post when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_post: Option<FinalPost>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation.
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    /// Creates a pending state.
    #[must_use]
    pub fn new(
        run_id: RunId,
        input: RunInput,
        external_context: serde_json::Value,
        max_revisions: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            input,
            external_context,
            stage_outputs: BTreeMap::new(),
            format: PostFormat::default(),
            pending_questions: Vec::new(),
            external_answers: None,
            current_stage: None,
            status: RunStatus::Pending,
            revision_count: 0,
            max_revisions,
            execution_log: Vec::new(),
            last_sequence: 0,
            terminal_error: None,
            final_post: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the latest output of a stage.
    #[must_use]
    pub fn output(&self, stage: StageName) -> Option<&StageOutput> {
        self.stage_outputs.get(&stage)
    }

    /// Number of times a stage was invoked.
    #[must_use]
    pub fn invocations(&self, stage: StageName) -> usize {
        self.execution_log.iter().filter(|r| r.stage == stage).count()
    }

    /// Stage names of the execution log, in order.
    #[must_use]
    pub fn stage_sequence(&self) -> Vec<StageName> {
        self.execution_log.iter().map(|r| r.stage).collect()
    }

    /// Returns true if the run reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Marks a stage as started.
    pub fn begin_stage(&mut self, stage: StageName) {
        self.current_stage = Some(stage);
        self.touch();
    }

    /// Appends a stage result; a successful output replaces the previous one.
    ///
    /// A failed result keeps the earlier output so later stages still see
    /// the last good payload.
    pub fn record(&mut self, result: StageResult) {
        if result.is_success() {
            self.stage_outputs.insert(result.stage, result.output.clone());
        }
        self.execution_log.push(result);
        self.touch();
    }

    /// Moves to a new non-failed status.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed or if `next` is
    /// `Failed` (use [`PipelineState::fail`]).
    pub fn transition(&mut self, next: RunStatus) -> Result<(), InvalidStateError> {
        if next == RunStatus::Failed || !self.status.can_transition_to(next) {
            return Err(InvalidStateError::new(
                self.run_id,
                InvalidStateKind::IllegalTransition,
                format!("cannot move from {} to {next}", self.status),
            )
            .with_status(self.status));
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Marks the run failed with a detail. A no-op on terminal states.
    pub fn fail(&mut self, detail: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RunStatus::Failed;
        self.terminal_error = Some(detail.into());
        self.touch();
    }

    /// Stores questions emitted before the pause. Only the first call wins.
    pub fn set_pending_questions(&mut self, questions: Vec<ClarifyingQuestion>) {
        if self.pending_questions.is_empty() {
            self.pending_questions = questions;
            self.touch();
        }
    }

    /// Stores the answers supplied at resume.
    ///
    /// # Errors
    ///
    /// Returns an error if answers were already supplied.
    pub fn set_external_answers(
        &mut self,
        answers: ExternalAnswers,
    ) -> Result<(), InvalidStateError> {
        if self.external_answers.is_some() {
            return Err(InvalidStateError::new(
                self.run_id,
                InvalidStateKind::AnswersAlreadySet,
                "external answers were already supplied",
            )
            .with_status(self.status));
        }
        self.external_answers = Some(answers);
        self.touch();
        Ok(())
    }

    /// Required questions without an answer.
    #[must_use]
    pub fn unanswered_required(&self) -> Vec<&ClarifyingQuestion> {
        let answers = self.external_answers.as_ref();
        self.pending_questions
            .iter()
            .filter(|q| q.required)
            .filter(|q| {
                answers
                    .and_then(|a| a.get(&q.question_id))
                    .map_or(true, |answer| answer.trim().is_empty())
            })
            .collect()
    }

    /// Increments the revision counter if the budget allows.
    ///
    /// Returns false, leaving the counter unchanged, at the ceiling.
    pub fn increment_revision(&mut self) -> bool {
        if self.revision_count >= self.max_revisions {
            return false;
        }
        self.revision_count += 1;
        self.touch();
        true
    }

    /// Checks that this state can be resumed under `run_id`.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn check_resumable(&self, run_id: RunId) -> Result<(), InvalidStateError> {
        let reject = |kind: InvalidStateKind, message: String| -> Result<(), InvalidStateError> {
            Err(InvalidStateError::new(run_id, kind, message).with_status(self.status))
        };

        if self.run_id != run_id {
            return reject(
                InvalidStateKind::RunMismatch,
                format!("state belongs to run {}", self.run_id),
            );
        }
        if self.status != RunStatus::AwaitingExternalInput {
            return reject(
                InvalidStateKind::NotAwaitingInput,
                format!("status is {}", self.status),
            );
        }
        if self.revision_count > self.max_revisions {
            return reject(
                InvalidStateKind::RevisionBoundExceeded,
                format!(
                    "revision count {} exceeds maximum {}",
                    self.revision_count, self.max_revisions
                ),
            );
        }
        if self.external_answers.is_some() {
            return reject(
                InvalidStateKind::AnswersAlreadySet,
                "external answers were already supplied".to_string(),
            );
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn awaiting_state() -> PipelineState {
        let mut state = PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::json!({}), 2);
        state.transition(RunStatus::Processing).unwrap();
        state.transition(RunStatus::AwaitingExternalInput).unwrap();
        state
    }

    #[test]
    fn test_new_state_defaults() {
        let state = PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::Value::Null, 2);
        assert_eq!(state.status, RunStatus::Pending);
        assert_eq!(state.format, PostFormat::Text);
        assert_eq!(state.revision_count, 0);
        assert_eq!(state.last_sequence, 0);
        assert!(state.execution_log.is_empty());
    }

    #[test]
    fn test_last_sequence_defaults_when_missing() {
        let state = awaiting_state();
        let mut encoded = serde_json::to_value(&state).unwrap();
        encoded.as_object_mut().unwrap().remove("last_sequence");

        let decoded: PipelineState = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.last_sequence, 0);
        assert_eq!(decoded.status, RunStatus::AwaitingExternalInput);
    }

    #[test]
    fn test_record_keeps_last_good_output() {
        let mut state = awaiting_state();
        let good = StageOutput::new().with("body_content", "v1");
        state.record(StageResult::success(StageName::Write, good.clone(), 1, 1, Utc::now()));
        state.record(StageResult::failure(StageName::Write, "boom", 3, 1, Utc::now()));

        assert_eq!(state.output(StageName::Write), Some(&good));
        assert_eq!(state.invocations(StageName::Write), 2);
    }

    #[test]
    fn test_transition_rejects_illegal_moves() {
        let mut state = awaiting_state();
        let err = state.transition(RunStatus::Completed).unwrap_err();
        assert_eq!(err.kind, InvalidStateKind::IllegalTransition);
        assert!(state.transition(RunStatus::Failed).is_err());
        assert_eq!(state.status, RunStatus::AwaitingExternalInput);
    }

    #[test]
    fn test_fail_sets_terminal_error_once() {
        let mut state = awaiting_state();
        state.fail("first");
        state.fail("second");
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.terminal_error.as_deref(), Some("first"));
    }

    #[test]
    fn test_increment_revision_is_bounded() {
        let mut state = awaiting_state();
        assert!(state.increment_revision());
        assert!(state.increment_revision());
        assert!(!state.increment_revision());
        assert_eq!(state.revision_count, 2);
    }

    #[test]
    fn test_answers_set_once() {
        let mut state = awaiting_state();
        state.set_external_answers(ExternalAnswers::new()).unwrap();
        let err = state.set_external_answers(ExternalAnswers::new()).unwrap_err();
        assert_eq!(err.kind, InvalidStateKind::AnswersAlreadySet);
    }

    #[test]
    fn test_check_resumable() {
        let state = awaiting_state();
        assert!(state.check_resumable(state.run_id).is_ok());

        let err = state.check_resumable(RunId::new()).unwrap_err();
        assert_eq!(err.kind, InvalidStateKind::RunMismatch);

        let mut corrupted = state.clone();
        corrupted.revision_count = 3;
        let err = corrupted.check_resumable(corrupted.run_id).unwrap_err();
        assert_eq!(err.kind, InvalidStateKind::RevisionBoundExceeded);

        let mut done = state;
        done.status = RunStatus::Completed;
        let err = done.check_resumable(done.run_id).unwrap_err();
        assert_eq!(err.kind, InvalidStateKind::NotAwaitingInput);
        assert_eq!(err.status, Some(RunStatus::Completed));
    }

    #[test]
    fn test_unanswered_required() {
        let mut state = awaiting_state();
        state.set_pending_questions(vec![
            ClarifyingQuestion::new("q1", "Audience?"),
            ClarifyingQuestion::new("q2", "Data?").optional(),
            ClarifyingQuestion::new("q3", "Tone?"),
        ]);
        let mut answers = ExternalAnswers::new();
        answers.insert("q1".to_string(), "engineers".to_string());
        answers.insert("q3".to_string(), "  ".to_string());
        state.set_external_answers(answers).unwrap();

        let missing: Vec<_> = state.unanswered_required().iter().map(|q| q.question_id.clone()).collect();
        assert_eq!(missing, vec!["q3".to_string()]);
    }
}
