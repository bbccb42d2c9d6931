//! Testing utilities for draftflow runs.
//!
//! This module provides:
//! - Scripted stages that play back outcomes and record their inputs
//! - Canned stage outputs and a shared stage-set fixture
//! - Assertions over event streams and run states

mod assertions;
mod fixtures;
mod stages;

pub use assertions::{
    assert_all_succeeded, assert_kinds, assert_ordered, assert_single_done,
    assert_stage_sequence, assert_status,
};
pub use fixtures::{
    answers, optimize_output, strategize_output, validate_output, visual_output, write_output,
    StageFixture,
};
pub use stages::ScriptedStage;
