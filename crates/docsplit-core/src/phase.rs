//! Pipeline phases and their lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of a job. Phases run in declaration order; each is resumable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Preflight,
    Split,
    Upload,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Preflight, Phase::Split, Phase::Upload];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Preflight => "PREFLIGHT",
            Phase::Split => "SPLIT",
            Phase::Upload => "UPLOAD",
        }
    }

    /// Directory name used by the state store layout.
    pub fn dir_name(self) -> &'static str {
        match self {
            Phase::Preflight => "preflight",
            Phase::Split => "split",
            Phase::Upload => "upload",
        }
    }

    /// Case-insensitive parse of a phase name (`split`, `SPLIT`, ...).
    pub fn parse(s: &str) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// Phase that must have succeeded before this one may start.
    pub fn predecessor(self) -> Option<Phase> {
        match self {
            Phase::Preflight => None,
            Phase::Split => Some(Phase::Preflight),
            Phase::Upload => Some(Phase::Split),
        }
    }

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Preflight => Some(Phase::Split),
            Phase::Split => Some(Phase::Upload),
            Phase::Upload => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one phase of one job.
///
/// `Pending` is the sentinel for a phase that was never started; it is never
/// written by the engine, only returned when no state exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Pending,
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Pending => "PENDING",
            PhaseStatus::Running => "RUNNING",
            PhaseStatus::Success => "SUCCESS",
            PhaseStatus::PartialSuccess => "PARTIAL_SUCCESS",
            PhaseStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "PENDING" => PhaseStatus::Pending,
            "RUNNING" => PhaseStatus::Running,
            "SUCCESS" => PhaseStatus::Success,
            "PARTIAL_SUCCESS" => PhaseStatus::PartialSuccess,
            _ => PhaseStatus::Failed,
        }
    }

    /// True for SUCCESS, PARTIAL_SUCCESS and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Success | PhaseStatus::PartialSuccess | PhaseStatus::Failed
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order() {
        assert_eq!(Phase::Preflight.predecessor(), None);
        assert_eq!(Phase::Split.predecessor(), Some(Phase::Preflight));
        assert_eq!(Phase::Upload.predecessor(), Some(Phase::Split));
        assert_eq!(Phase::Split.next(), Some(Phase::Upload));
        assert_eq!(Phase::Upload.next(), None);
    }

    #[test]
    fn phase_parse_is_case_insensitive() {
        assert_eq!(Phase::parse("split"), Some(Phase::Split));
        assert_eq!(Phase::parse(" UPLOAD "), Some(Phase::Upload));
        assert_eq!(Phase::parse("Preflight"), Some(Phase::Preflight));
        assert_eq!(Phase::parse("merge"), None);
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&PhaseStatus::PartialSuccess).unwrap();
        assert_eq!(json, "\"PARTIAL_SUCCESS\"");
        assert_eq!(PhaseStatus::from_str("PARTIAL_SUCCESS"), PhaseStatus::PartialSuccess);
        assert!(!PhaseStatus::Running.is_terminal());
        assert!(!PhaseStatus::Pending.is_terminal());
        assert!(PhaseStatus::Failed.is_terminal());
    }
}
