use std::fmt;

use serde::Serialize;

/// Lifecycle stages of one analysis job. Progress events walk the
/// stages in declaration order; `Cancelled` and `Error` are reachable
/// from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Downloading,
    Segmenting,
    Transcribing,
    Punctuating,
    Analyzing,
    Completed,
    Cancelled,
    Error,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Cancelled | Stage::Error)
    }

    /// Whether a job currently at `self` may emit an event at `next`.
    /// Re-emitting the current stage is allowed; skipping forward is
    /// allowed (the punctuating stage is optional); moving backwards
    /// is not.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Stage::Cancelled | Stage::Error) {
            return true;
        }
        next.ordinal() >= self.ordinal()
    }

    fn ordinal(&self) -> u8 {
        match self {
            Stage::Received => 0,
            Stage::Downloading => 1,
            Stage::Segmenting => 2,
            Stage::Transcribing => 3,
            Stage::Punctuating => 4,
            Stage::Analyzing => 5,
            Stage::Completed => 6,
            Stage::Cancelled => 7,
            Stage::Error => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Downloading => "downloading",
            Stage::Segmenting => "segmenting",
            Stage::Transcribing => "transcribing",
            Stage::Punctuating => "punctuating",
            Stage::Analyzing => "analyzing",
            Stage::Completed => "completed",
            Stage::Cancelled => "cancelled",
            Stage::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
