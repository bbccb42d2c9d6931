//! Test fixtures: canned stage outputs and a scripted stage set.

use std::sync::Arc;

use serde_json::json;

use super::ScriptedStage;
use crate::context::ExternalAnswers;
use crate::core::{keys, PostFormat, StageName, StageOutput};
use crate::stages::{Stage, StageSet};

/// Validate output with a decision and a score.
#[must_use]
pub fn validate_output(decision: &str, quality_score: f64) -> StageOutput {
    StageOutput::new()
        .with(keys::DECISION, decision)
        .with(keys::QUALITY_SCORE, quality_score)
        .with(keys::REASONING, "fixture")
        .with(keys::REFINEMENT_SUGGESTIONS, json!(["Narrow the audience"]))
}

/// Strategize output recommending `format` and asking `questions`
/// (`(question_id, question)` pairs).
#[must_use]
pub fn strategize_output(format: PostFormat, questions: &[(&str, &str)]) -> StageOutput {
    let questions: Vec<serde_json::Value> = questions
        .iter()
        .map(|(id, text)| json!({"question_id": id, "question": text, "required": true}))
        .collect();
    StageOutput::new()
        .with(keys::RECOMMENDED_FORMAT, format.to_string())
        .with(keys::STRUCTURE_TYPE, "story")
        .with(keys::CLARIFYING_QUESTIONS, questions)
}

/// Write output with the given `(text, score)` hooks.
#[must_use]
pub fn write_output(hooks: &[(&str, f64)]) -> StageOutput {
    let hooks: Vec<serde_json::Value> = hooks
        .iter()
        .zip(1u32..)
        .map(|((text, score), version)| json!({"version": version, "text": text, "score": score}))
        .collect();
    StageOutput::new()
        .with(keys::HOOKS, hooks)
        .with(keys::BODY_CONTENT, "Draft body")
        .with(keys::CTA, "What do you think?")
        .with(keys::HASHTAGS, json!(["#writing", "#rust"]))
}

/// Visual output with a slide count.
#[must_use]
pub fn visual_output(total_slides: u64) -> StageOutput {
    StageOutput::new()
        .with(keys::TOTAL_SLIDES, total_slides)
        .with(keys::OVERALL_STYLE, "minimal")
}

/// Optimize output with a decision and a score.
#[must_use]
pub fn optimize_output(decision: &str, quality_score: f64) -> StageOutput {
    StageOutput::new()
        .with(keys::DECISION, decision)
        .with(keys::QUALITY_SCORE, quality_score)
        .with(keys::SUGGESTIONS, json!(["Tighten the opening"]))
        .with(keys::PREDICTED_IMPRESSIONS_MIN, 1500)
        .with(keys::PREDICTED_IMPRESSIONS_MAX, 4000)
}

/// Answers keyed by question id.
#[must_use]
pub fn answers(pairs: &[(&str, &str)]) -> ExternalAnswers {
    pairs
        .iter()
        .map(|(id, answer)| ((*id).to_string(), (*answer).to_string()))
        .collect()
}

/// One scripted stage per executable stage, shared with the [`StageSet`]
/// so tests can inspect calls after a run.
#[derive(Debug, Clone)]
pub struct StageFixture {
    /// Validate stage.
    pub validate: Arc<ScriptedStage>,
    /// Strategize stage.
    pub strategize: Arc<ScriptedStage>,
    /// Write stage.
    pub write: Arc<ScriptedStage>,
    /// Visual stage.
    pub visual: Arc<ScriptedStage>,
    /// Optimize stage.
    pub optimize: Arc<ScriptedStage>,
}

impl StageFixture {
    /// The happy path: approve 8.5, text with two questions, three hooks,
    /// optimize approves.
    #[must_use]
    pub fn approving() -> Self {
        Self {
            validate: Arc::new(ScriptedStage::always("validate", validate_output("APPROVE", 8.5))),
            strategize: Arc::new(ScriptedStage::always(
                "strategize",
                strategize_output(
                    PostFormat::Text,
                    &[("q1", "Who is the audience?"), ("q2", "What is the key result?")],
                ),
            )),
            write: Arc::new(ScriptedStage::always(
                "write",
                write_output(&[("Hook one", 7.0), ("Hook two", 9.0), ("Hook three", 8.0)]),
            )),
            visual: Arc::new(ScriptedStage::always("visual", visual_output(5))),
            optimize: Arc::new(ScriptedStage::always("optimize", optimize_output("APPROVE", 8.8))),
        }
    }

    /// Replaces one stage's script. Ignored for `finalize`.
    #[must_use]
    pub fn with(mut self, name: StageName, stage: ScriptedStage) -> Self {
        let stage = Arc::new(stage);
        match name {
            StageName::Validate => self.validate = stage,
            StageName::Strategize => self.strategize = stage,
            StageName::Write => self.write = stage,
            StageName::Visual => self.visual = stage,
            StageName::Optimize => self.optimize = stage,
            StageName::Finalize => {}
        }
        self
    }

    /// Calls made to a stage so far.
    #[must_use]
    pub fn calls(&self, name: StageName) -> usize {
        match name {
            StageName::Validate => self.validate.calls(),
            StageName::Strategize => self.strategize.calls(),
            StageName::Write => self.write.calls(),
            StageName::Visual => self.visual.calls(),
            StageName::Optimize => self.optimize.calls(),
            StageName::Finalize => 0,
        }
    }

    /// A stage set dispatching to the fixture's stages.
    #[must_use]
    pub fn stage_set(&self) -> StageSet {
        StageSet::from_shared(
            Arc::clone(&self.validate) as Arc<dyn Stage>,
            Arc::clone(&self.strategize) as Arc<dyn Stage>,
            Arc::clone(&self.write) as Arc<dyn Stage>,
            Arc::clone(&self.visual) as Arc<dyn Stage>,
            Arc::clone(&self.optimize) as Arc<dyn Stage>,
        )
    }
}

impl Default for StageFixture {
    fn default() -> Self {
        Self::approving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_outputs_parse() {
        assert_eq!(strategize_output(PostFormat::Carousel, &[]).recommended_format(), Some(PostFormat::Carousel));
        assert_eq!(strategize_output(PostFormat::Text, &[("q1", "?")]).clarifying_questions().len(), 1);
        assert_eq!(write_output(&[("a", 1.0), ("b", 2.0)]).hooks()[1].version, 2);
        assert_eq!(optimize_output("REVISE", 6.0).predicted_impressions(), Some((1500, 4000)));
    }

    #[test]
    fn test_fixture_stage_set_shares_stages() {
        let fixture = StageFixture::approving();
        let stages = fixture.stage_set();
        assert_eq!(stages.get(StageName::Write).unwrap().name(), "write");
        assert_eq!(fixture.calls(StageName::Write), 0);
    }
}
