//! Stage names, stage status and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of stages in the drafting graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Scores the raw idea and decides approve/refine/reject.
    Validate,
    /// Picks format and structure, and asks clarifying questions.
    Strategize,
    /// Produces hooks, body, call to action and hashtags.
    Write,
    /// Produces carousel slide specifications.
    Visual,
    /// Scores the draft and decides approve/revise.
    Optimize,
    /// Assembles the final post from prior outputs.
    Finalize,
}

impl StageName {
    /// Every stage in graph order.
    pub const ALL: [Self; 6] = [
        Self::Validate,
        Self::Strategize,
        Self::Write,
        Self::Visual,
        Self::Optimize,
        Self::Finalize,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Strategize => "strategize",
            Self::Write => "write",
            Self::Visual => "visual",
            Self::Optimize => "optimize",
            Self::Finalize => "finalize",
        }
    }

    /// Returns a capitalized label for human-readable messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Validate => "Validate",
            Self::Strategize => "Strategize",
            Self::Write => "Write",
            Self::Visual => "Visual",
            Self::Optimize => "Optimize",
            Self::Finalize => "Finalize",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Outcome of a single stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage produced an output.
    Success,
    /// The stage failed on every attempt.
    Error,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Lifecycle status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Created, nothing has run yet.
    #[default]
    Pending,
    /// A stage sequence is executing.
    Processing,
    /// Suspended at the pause point until answers arrive.
    AwaitingExternalInput,
    /// The idea was rejected by validation.
    Rejected,
    /// The final post was assembled.
    Completed,
    /// The run failed.
    Failed,
    /// The run was cancelled by its caller.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::AwaitingExternalInput => write!(f, "awaitingExternalInput"),
            Self::Rejected => write!(f, "rejected"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunStatus {
    /// Returns true if no further stage may execute.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    /// Returns true if `next` is a legal successor of this status.
    ///
    /// The only backwards edge is `awaitingExternalInput -> processing`;
    /// callers enforce that it is taken once.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Processing | Self::Failed | Self::Cancelled),
            Self::Processing => matches!(
                next,
                Self::AwaitingExternalInput
                    | Self::Rejected
                    | Self::Completed
                    | Self::Failed
                    | Self::Cancelled
            ),
            Self::AwaitingExternalInput => {
                matches!(next, Self::Processing | Self::Failed | Self::Cancelled)
            }
            Self::Rejected | Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}
