//! Domain payload types carried inside stage outputs and the final post.

use super::PostFormat;
use serde::{Deserialize, Serialize};

/// A question the strategize stage wants the author to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    /// Stable identifier used to key the answer.
    pub question_id: String,
    /// The question text.
    pub question: String,
    /// Why the strategist is asking.
    #[serde(default)]
    pub rationale: String,
    /// Whether an answer is expected before writing.
    #[serde(default = "default_required")]
    pub required: bool,
}

const fn default_required() -> bool {
    true
}

impl ClarifyingQuestion {
    /// Creates a required question.
    #[must_use]
    pub fn new(question_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            question: question.into(),
            rationale: String::new(),
            required: true,
        }
    }

    /// Sets the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Marks the question optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// One candidate hook produced by the write stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookVariant {
    /// Variant number as emitted by the writer.
    #[serde(default)]
    pub version: u32,
    /// The hook text.
    pub text: String,
    /// Hook category, e.g. "question" or "statistic".
    #[serde(default)]
    pub hook_type: String,
    /// Self-assessed score out of 10.
    #[serde(default)]
    pub score: f64,
    /// Why the writer scored it this way.
    #[serde(default)]
    pub reasoning: String,
}

impl HookVariant {
    /// Creates a hook with a text and score.
    #[must_use]
    pub fn new(version: u32, text: impl Into<String>, score: f64) -> Self {
        Self {
            version,
            text: text.into(),
            hook_type: String::new(),
            score,
            reasoning: String::new(),
        }
    }
}

/// Picks the highest-scored hook; ties keep the earliest.
#[must_use]
pub fn best_hook(hooks: &[HookVariant]) -> Option<&HookVariant> {
    hooks.iter().fold(None, |best: Option<&HookVariant>, hook| match best {
        Some(current) if current.score >= hook.score => Some(current),
        _ => Some(hook),
    })
}

/// The assembled artifact of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalPost {
    /// Post format.
    pub format: PostFormat,
    /// Chosen hook text.
    pub hook: Option<String>,
    /// Body text.
    pub body: Option<String>,
    /// Call to action.
    pub cta: Option<String>,
    /// Hashtags, without changes to their order.
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Slide specifications when the visual stage ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_specs: Option<serde_json::Value>,
    /// Optimizer quality score.
    pub quality_score: Option<f64>,
    /// Predicted impressions as (min, max).
    pub predicted_impressions: Option<(u64, u64)>,
    /// Optimizer suggestions.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_defaults_required() {
        let q: ClarifyingQuestion =
            serde_json::from_str(r#"{"question_id":"q1","question":"Who is it for?"}"#).unwrap();
        assert!(q.required);
        assert!(q.rationale.is_empty());

        let q = ClarifyingQuestion::new("q2", "Any data?").optional();
        assert!(!q.required);
    }

    #[test]
    fn test_best_hook_picks_top_score() {
        let hooks = vec![
            HookVariant::new(1, "first", 7.0),
            HookVariant::new(2, "second", 9.0),
            HookVariant::new(3, "third", 8.5),
        ];
        assert_eq!(best_hook(&hooks).unwrap().text, "second");
    }

    #[test]
    fn test_best_hook_ties_keep_first() {
        let hooks = vec![HookVariant::new(1, "a", 8.0), HookVariant::new(2, "b", 8.0)];
        assert_eq!(best_hook(&hooks).unwrap().text, "a");
        assert!(best_hook(&[]).is_none());
    }
}
