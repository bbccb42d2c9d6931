//! Decision and format enums read from stage outputs.
//!
//! Stages may emit these in any letter case; parsing is case-insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decision emitted by the validate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidateDecision {
    /// The idea is good as-is.
    Approve,
    /// The idea is usable with refinements.
    Refine,
    /// The idea should not be drafted.
    Reject,
}

impl FromStr for ValidateDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "refine" => Ok(Self::Refine),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown validate decision '{other}'")),
        }
    }
}

impl fmt::Display for ValidateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Refine => write!(f, "refine"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Decision emitted by the optimize stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeDecision {
    /// The draft is ready.
    Approve,
    /// The draft should go back to the writer.
    Revise,
}

impl FromStr for OptimizeDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "revise" => Ok(Self::Revise),
            other => Err(format!("unknown optimize decision '{other}'")),
        }
    }
}

impl fmt::Display for OptimizeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Revise => write!(f, "revise"),
        }
    }
}

/// Post format chosen by the strategize stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostFormat {
    /// Plain text post.
    #[default]
    Text,
    /// Multi-slide carousel.
    Carousel,
    /// Video post.
    Video,
}

impl PostFormat {
    /// Returns true if the visual stage must run for this format.
    #[must_use]
    pub const fn requires_visual(&self) -> bool {
        matches!(self, Self::Carousel)
    }
}

impl FromStr for PostFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "carousel" => Ok(Self::Carousel),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown post format '{other}'")),
        }
    }
}

impl fmt::Display for PostFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Carousel => write!(f, "carousel"),
            Self::Video => write!(f, "video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decisions_parse_any_case() {
        assert_eq!("APPROVE".parse::<ValidateDecision>().unwrap(), ValidateDecision::Approve);
        assert_eq!("Reject".parse::<ValidateDecision>().unwrap(), ValidateDecision::Reject);
        assert_eq!("REVISE".parse::<OptimizeDecision>().unwrap(), OptimizeDecision::Revise);
        assert!("maybe".parse::<OptimizeDecision>().is_err());
    }

    #[test]
    fn test_format_requires_visual() {
        assert!(PostFormat::Carousel.requires_visual());
        assert!(!PostFormat::Text.requires_visual());
        assert!(!PostFormat::Video.requires_visual());
        assert_eq!(PostFormat::default(), PostFormat::Text);
    }

    #[test]
    fn test_format_serialize() {
        let json = serde_json::to_string(&PostFormat::Carousel).unwrap();
        assert_eq!(json, r#""carousel""#);
    }
}
