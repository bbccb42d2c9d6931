//! One-line summaries derived purely from a stage output.

use crate::core::{keys, StageName, StageOutput};

/// Builds the human-readable summary for a stage output.
#[must_use]
pub fn summarize(stage: StageName, output: &StageOutput) -> String {
    match stage {
        StageName::Validate => format!(
            "Decision: {} | Quality Score: {}/10",
            decision_label(output),
            output.quality_score().unwrap_or(0.0)
        ),
        StageName::Strategize => format!(
            "Format: {} | Structure: {} | Questions: {}",
            output.get_str(keys::RECOMMENDED_FORMAT).unwrap_or("text"),
            output.get_str(keys::STRUCTURE_TYPE).unwrap_or("unknown"),
            output.array_len(keys::CLARIFYING_QUESTIONS)
        ),
        StageName::Write => {
            let hooks = output.hooks();
            let best = hooks.iter().map(|h| h.score).fold(0.0_f64, f64::max);
            format!(
                "Hooks: {} (best score: {best}/10) | Hashtags: {}",
                hooks.len(),
                output.array_len(keys::HASHTAGS)
            )
        }
        StageName::Visual => {
            let specs = output
                .get("visual_specs")
                .and_then(serde_json::Value::as_object)
                .map_or_else(|| output.clone(), |m| StageOutput::from(m.clone()));
            format!(
                "Slides: {} | Style: {}",
                specs.get_u64(keys::TOTAL_SLIDES).unwrap_or(0),
                specs.get_str(keys::OVERALL_STYLE).unwrap_or("default")
            )
        }
        StageName::Optimize => format!(
            "Decision: {} | Quality: {}/10 | Predicted: {}-{} impressions",
            decision_label(output),
            output.quality_score().unwrap_or(0.0),
            group_thousands(output.get_u64(keys::PREDICTED_IMPRESSIONS_MIN).unwrap_or(0)),
            group_thousands(output.get_u64(keys::PREDICTED_IMPRESSIONS_MAX).unwrap_or(0))
        ),
        StageName::Finalize => "Completed".to_string(),
    }
}

fn decision_label(output: &StageOutput) -> String {
    output
        .decision()
        .map_or_else(|| "UNKNOWN".to_string(), str::to_ascii_uppercase)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_validate_summary() {
        let output = StageOutput::new()
            .with(keys::DECISION, "approve")
            .with(keys::QUALITY_SCORE, 8.5);
        assert_eq!(
            summarize(StageName::Validate, &output),
            "Decision: APPROVE | Quality Score: 8.5/10"
        );
    }

    #[test]
    fn test_strategize_summary_defaults() {
        assert_eq!(
            summarize(StageName::Strategize, &StageOutput::new()),
            "Format: text | Structure: unknown | Questions: 0"
        );
    }

    #[test]
    fn test_write_summary() {
        let output = StageOutput::from_value(json!({
            "hooks": [
                {"version": 1, "text": "a", "score": 7.5},
                {"version": 2, "text": "b", "score": 9.0}
            ],
            "hashtags": ["#a", "#b", "#c"]
        }));
        assert_eq!(
            summarize(StageName::Write, &output),
            "Hooks: 2 (best score: 9/10) | Hashtags: 3"
        );
    }

    #[test]
    fn test_visual_summary_nested_specs() {
        let output = StageOutput::from_value(json!({
            "visual_specs": {"total_slides": 6, "overall_style": "minimal"}
        }));
        assert_eq!(summarize(StageName::Visual, &output), "Slides: 6 | Style: minimal");
    }

    #[test]
    fn test_optimize_summary_groups_digits() {
        let output = StageOutput::new()
            .with(keys::DECISION, "REVISE")
            .with(keys::QUALITY_SCORE, 6.0)
            .with(keys::PREDICTED_IMPRESSIONS_MIN, 1500)
            .with(keys::PREDICTED_IMPRESSIONS_MAX, 1_250_000);
        assert_eq!(
            summarize(StageName::Optimize, &output),
            "Decision: REVISE | Quality: 6/10 | Predicted: 1,500-1,250,000 impressions"
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(123_456_789), "123,456,789");
    }
}
