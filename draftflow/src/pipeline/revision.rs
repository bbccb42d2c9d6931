//! Revision loop controller.

use crate::core::{OptimizeDecision, StageOutput};

/// Returns true iff the optimizer asked for a revision and budget remains.
///
/// Terminates because `revision_count` only grows and is capped by
/// `max_revisions`.
#[must_use]
pub fn should_revise(optimize_output: &StageOutput, revision_count: u32, max_revisions: u32) -> bool {
    optimize_output.optimize_decision() == Some(OptimizeDecision::Revise)
        && revision_count < max_revisions
}
