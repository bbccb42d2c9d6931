//! Structured stage output payload.
//!
//! A stage returns a JSON object. The engine only reads a handful of well-known
//! keys from it (decisions, format, questions, hooks); everything else is
//! carried through untouched to the final post and the event stream.

use super::{
    ClarifyingQuestion, HookVariant, OptimizeDecision, PostFormat, ValidateDecision,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known output keys.
pub mod keys {
    /// Decision field of validate and optimize.
    pub const DECISION: &str = "decision";
    /// Quality score out of 10.
    pub const QUALITY_SCORE: &str = "quality_score";
    /// Free-form reasoning.
    pub const REASONING: &str = "reasoning";
    /// Validate refinement suggestions.
    pub const REFINEMENT_SUGGESTIONS: &str = "refinement_suggestions";
    /// Format chosen by strategize.
    pub const RECOMMENDED_FORMAT: &str = "recommended_format";
    /// Structure chosen by strategize.
    pub const STRUCTURE_TYPE: &str = "structure_type";
    /// Questions for the author.
    pub const CLARIFYING_QUESTIONS: &str = "clarifying_questions";
    /// Hook variants from write.
    pub const HOOKS: &str = "hooks";
    /// Body text from write.
    pub const BODY_CONTENT: &str = "body_content";
    /// Call to action from write.
    pub const CTA: &str = "cta";
    /// Hashtags from write.
    pub const HASHTAGS: &str = "hashtags";
    /// Slide count from visual.
    pub const TOTAL_SLIDES: &str = "total_slides";
    /// Style from visual.
    pub const OVERALL_STYLE: &str = "overall_style";
    /// Optimizer suggestions.
    pub const SUGGESTIONS: &str = "suggestions";
    /// Lower impressions estimate.
    pub const PREDICTED_IMPRESSIONS_MIN: &str = "predicted_impressions_min";
    /// Upper impressions estimate.
    pub const PREDICTED_IMPRESSIONS_MAX: &str = "predicted_impressions_max";
}

/// The structured payload returned by a stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageOutput(Map<String, Value>);

impl StageOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an output from a JSON value; non-objects become empty.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Adds a field, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns a numeric field as f64.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Returns a numeric field as u64.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Returns the string items of an array field, skipping non-strings.
    #[must_use]
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the length of an array field, 0 when absent.
    #[must_use]
    pub fn array_len(&self, key: &str) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Returns true if the output has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Raw decision string, if present.
    #[must_use]
    pub fn decision(&self) -> Option<&str> {
        self.get_str(keys::DECISION)
    }

    /// Decision parsed as a validate decision.
    #[must_use]
    pub fn validate_decision(&self) -> Option<ValidateDecision> {
        self.decision().and_then(|d| d.parse().ok())
    }

    /// Decision parsed as an optimize decision.
    #[must_use]
    pub fn optimize_decision(&self) -> Option<OptimizeDecision> {
        self.decision().and_then(|d| d.parse().ok())
    }

    /// Quality score, if present.
    #[must_use]
    pub fn quality_score(&self) -> Option<f64> {
        self.get_f64(keys::QUALITY_SCORE)
    }

    /// Format recommended by strategize, if present and recognised.
    #[must_use]
    pub fn recommended_format(&self) -> Option<PostFormat> {
        self.get_str(keys::RECOMMENDED_FORMAT)
            .and_then(|f| f.parse().ok())
    }

    /// Clarifying questions; malformed entries are skipped.
    #[must_use]
    pub fn clarifying_questions(&self) -> Vec<ClarifyingQuestion> {
        self.typed_items(keys::CLARIFYING_QUESTIONS)
    }

    /// Hook variants; malformed entries are skipped.
    #[must_use]
    pub fn hooks(&self) -> Vec<HookVariant> {
        self.typed_items(keys::HOOKS)
    }

    /// Predicted impressions as (min, max) when both bounds are present.
    #[must_use]
    pub fn predicted_impressions(&self) -> Option<(u64, u64)> {
        Some((
            self.get_u64(keys::PREDICTED_IMPRESSIONS_MIN)?,
            self.get_u64(keys::PREDICTED_IMPRESSIONS_MAX)?,
        ))
    }

    fn typed_items<T: serde::de::DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<Map<String, Value>> for StageOutput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
