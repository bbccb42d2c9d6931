//! The fixed stage graph.
//!
//! ```text
//! validate -> strategize -> [pause] -> write -> (visual?) -> optimize -> (write | finalize)
//!     \-> reject
//! ```

use super::revision::should_revise;
use crate::context::PipelineState;
use crate::core::{StageName, StageResult, ValidateDecision};

/// What the orchestrator does after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the given stage next.
    Run(StageName),
    /// Suspend until external answers arrive.
    Pause,
    /// End the run as rejected.
    Reject,
}

/// First stage of a fresh run.
pub const ENTRY: StageName = StageName::Validate;

/// First stage after a resume.
pub const RESUME_ENTRY: StageName = StageName::Write;

/// Picks the next step from the result just recorded.
///
/// Routing reads the result's own output, not the accumulated state, so a
/// failed optimize pass never replays an earlier `revise`.
#[must_use]
pub fn next_after(result: &StageResult, state: &PipelineState) -> Transition {
    match result.stage {
        StageName::Validate => {
            if result.output.validate_decision() == Some(ValidateDecision::Reject) {
                Transition::Reject
            } else {
                Transition::Run(StageName::Strategize)
            }
        }
        StageName::Strategize => Transition::Pause,
        StageName::Write => {
            if state.format.requires_visual() {
                Transition::Run(StageName::Visual)
            } else {
                Transition::Run(StageName::Optimize)
            }
        }
        StageName::Visual => Transition::Run(StageName::Optimize),
        StageName::Optimize => {
            if should_revise(&result.output, state.revision_count, state.max_revisions) {
                Transition::Run(StageName::Write)
            } else {
                Transition::Run(StageName::Finalize)
            }
        }
        StageName::Finalize => Transition::Run(StageName::Finalize),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RunId, RunInput};
    use crate::core::{keys, PostFormat, StageOutput};
    use chrono::Utc;

    fn state() -> PipelineState {
        PipelineState::new(RunId::new(), RunInput::new("idea"), serde_json::Value::Null, 2)
    }

    fn result(stage: StageName, output: StageOutput) -> StageResult {
        StageResult::success(stage, output, 1, 1, Utc::now())
    }

    #[test]
    fn test_validate_routes() {
        let s = state();
        let reject = result(StageName::Validate, StageOutput::new().with(keys::DECISION, "REJECT"));
        let refine = result(StageName::Validate, StageOutput::new().with(keys::DECISION, "REFINE"));
        let failed = StageResult::failure(StageName::Validate, "boom", 3, 1, Utc::now());

        assert_eq!(next_after(&reject, &s), Transition::Reject);
        assert_eq!(next_after(&refine, &s), Transition::Run(StageName::Strategize));
        assert_eq!(next_after(&failed, &s), Transition::Run(StageName::Strategize));
    }

    #[test]
    fn test_strategize_pauses() {
        let r = result(StageName::Strategize, StageOutput::new());
        assert_eq!(next_after(&r, &state()), Transition::Pause);
    }

    #[test]
    fn test_format_branch() {
        let mut s = state();
        let write = result(StageName::Write, StageOutput::new());
        assert_eq!(next_after(&write, &s), Transition::Run(StageName::Optimize));

        s.format = PostFormat::Carousel;
        assert_eq!(next_after(&write, &s), Transition::Run(StageName::Visual));

        let visual = result(StageName::Visual, StageOutput::new());
        assert_eq!(next_after(&visual, &s), Transition::Run(StageName::Optimize));
    }

    #[test]
    fn test_optimize_loop_is_bounded() {
        let mut s = state();
        let revise = result(StageName::Optimize, StageOutput::new().with(keys::DECISION, "REVISE"));
        assert_eq!(next_after(&revise, &s), Transition::Run(StageName::Write));

        s.revision_count = 2;
        assert_eq!(next_after(&revise, &s), Transition::Run(StageName::Finalize));
    }
}
