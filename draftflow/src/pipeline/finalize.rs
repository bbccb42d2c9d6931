//! Final post assembly.

use crate::context::PipelineState;
use crate::core::{best_hook, keys, FinalPost, StageName};

/// Assembles the final post from the latest write, visual and optimize
/// outputs. Missing outputs yield empty fields.
#[must_use]
pub fn assemble(state: &PipelineState) -> FinalPost {
    let write = state.output(StageName::Write);
    let optimize = state.output(StageName::Optimize);

    let hook = write.and_then(|w| best_hook(&w.hooks()).map(|h| h.text.clone()));
    let visual_specs = if state.format.requires_visual() {
        state
            .output(StageName::Visual)
            .map(|v| v.clone().into_value())
    } else {
        None
    };

    FinalPost {
        format: state.format,
        hook,
        body: write.and_then(|w| w.get_str(keys::BODY_CONTENT)).map(str::to_owned),
        cta: write.and_then(|w| w.get_str(keys::CTA)).map(str::to_owned),
        hashtags: write.map(|w| w.get_strings(keys::HASHTAGS)).unwrap_or_default(),
        visual_specs,
        quality_score: optimize.and_then(|o| o.quality_score()),
        predicted_impressions: optimize.and_then(|o| o.predicted_impressions()),
        suggestions: optimize
            .map(|o| o.get_strings(keys::SUGGESTIONS))
            .unwrap_or_default(),
    }
}
