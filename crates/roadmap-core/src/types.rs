use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PhaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Blocked,
    Complete,
}

impl PhaseStatus {
    pub fn all() -> &'static [PhaseStatus] {
        &[
            PhaseStatus::NotStarted,
            PhaseStatus::InProgress,
            PhaseStatus::Blocked,
            PhaseStatus::Complete,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "not_started",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Blocked => "blocked",
            PhaseStatus::Complete => "complete",
        }
    }

    /// Marker used in the markdown projection.
    pub fn marker(self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "⬜",
            PhaseStatus::InProgress => "🔄",
            PhaseStatus::Blocked => "🚫",
            PhaseStatus::Complete => "✅",
        }
    }

    /// Parse a projection marker. Accepts the emoji markers and their ASCII
    /// aliases so hand-written roadmaps can be imported.
    pub fn from_marker(marker: &str) -> Option<PhaseStatus> {
        match marker {
            "⬜" | "TODO" => Some(PhaseStatus::NotStarted),
            "🔄" | "WIP" => Some(PhaseStatus::InProgress),
            "🚫" | "BLOCKED" => Some(PhaseStatus::Blocked),
            "✅" | "DONE" => Some(PhaseStatus::Complete),
            _ => None,
        }
    }

    pub fn has_assignee(self) -> bool {
        matches!(self, PhaseStatus::InProgress | PhaseStatus::Complete)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = crate::error::RoadmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" | "not-started" => Ok(PhaseStatus::NotStarted),
            "in_progress" | "in-progress" => Ok(PhaseStatus::InProgress),
            "blocked" => Ok(PhaseStatus::Blocked),
            "complete" => Ok(PhaseStatus::Complete),
            _ => Err(crate::error::RoadmapError::Parse(format!(
                "unknown status '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
