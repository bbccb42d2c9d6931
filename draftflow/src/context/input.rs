//! Read-only, stage-specific views over the run state.

use super::{ExternalAnswers, PipelineState, RunId, RunInput};
use crate::core::{ClarifyingQuestion, PostFormat, StageName, StageOutput};
use std::collections::BTreeMap;

/// Prior outputs each stage is allowed to see.
const fn visible_outputs(stage: StageName) -> &'static [StageName] {
    match stage {
        StageName::Validate => &[],
        StageName::Strategize => &[StageName::Validate],
        StageName::Write => &[StageName::Validate, StageName::Strategize, StageName::Optimize],
        StageName::Visual => &[StageName::Strategize, StageName::Write],
        StageName::Optimize => &[StageName::Strategize, StageName::Write, StageName::Visual],
        StageName::Finalize => &[
            StageName::Validate,
            StageName::Strategize,
            StageName::Write,
            StageName::Visual,
            StageName::Optimize,
        ],
    }
}

/// What a stage receives: a snapshot of the fields it needs.
///
/// Built fresh for each invocation and never written back.
#[derive(Debug, Clone, PartialEq)]
pub struct StageInput {
    stage: StageName,
    run_id: RunId,
    input: RunInput,
    external_context: serde_json::Value,
    format: PostFormat,
    revision_count: u32,
    outputs: BTreeMap<StageName, StageOutput>,
    questions: Vec<ClarifyingQuestion>,
    answers: Option<ExternalAnswers>,
}

impl StageInput {
    /// Builds the view a stage gets over `state`.
    #[must_use]
    pub fn for_stage(stage: StageName, state: &PipelineState) -> Self {
        let outputs = visible_outputs(stage)
            .iter()
            .filter_map(|s| state.output(*s).map(|o| (*s, o.clone())))
            .collect();

        let sees_exchange = matches!(stage, StageName::Write | StageName::Finalize);

        Self {
            stage,
            run_id: state.run_id,
            input: state.input.clone(),
            external_context: state.external_context.clone(),
            format: state.format,
            revision_count: state.revision_count,
            outputs,
            questions: if sees_exchange {
                state.pending_questions.clone()
            } else {
                Vec::new()
            },
            answers: if sees_exchange {
                state.external_answers.clone()
            } else {
                None
            },
        }
    }

    /// Stage this view was built for.
    #[must_use]
    pub const fn stage(&self) -> StageName {
        self.stage
    }

    /// Run id.
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Original request.
    #[must_use]
    pub const fn input(&self) -> &RunInput {
        &self.input
    }

    /// Caller-supplied profile snapshot.
    #[must_use]
    pub const fn external_context(&self) -> &serde_json::Value {
        &self.external_context
    }

    /// Current post format.
    #[must_use]
    pub const fn format(&self) -> PostFormat {
        self.format
    }

    /// Revision loops completed so far.
    #[must_use]
    pub const fn revision_count(&self) -> u32 {
        self.revision_count
    }

    /// A prior stage's latest output, if visible to this stage.
    #[must_use]
    pub fn output(&self, stage: StageName) -> Option<&StageOutput> {
        self.outputs.get(&stage)
    }

    /// Clarifying questions (write only).
    #[must_use]
    pub fn questions(&self) -> &[ClarifyingQuestion] {
        &self.questions
    }

    /// Author answers (write only).
    #[must_use]
    pub const fn answers(&self) -> Option<&ExternalAnswers> {
        self.answers.as_ref()
    }

    /// Optimizer feedback from the previous pass, present on revisions.
    #[must_use]
    pub fn revision_feedback(&self) -> Option<&StageOutput> {
        if self.stage == StageName::Write && self.revision_count > 0 {
            self.output(StageName::Optimize)
        } else {
            None
        }
    }
}
