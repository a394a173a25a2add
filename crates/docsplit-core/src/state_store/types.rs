//! Objects kept in the state store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job_db::unix_millis;
use crate::phase::{Phase, PhaseStatus};
use crate::preflight::PreflightReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: u32,
    pub done: u32,
    pub failed: u32,
}

impl Counts {
    pub fn finished(&self) -> u32 {
        self.done + self.failed
    }

    /// `(done + failed) * 100 / total`, 0 for an empty phase.
    pub fn progress(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = u64::from(self.finished()) * 100 / u64::from(self.total);
        pct.min(100) as u8
    }
}

/// Preflight numbers surfaced on the preflight phase state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightSummary {
    pub total_units: u32,
    pub outputs: usize,
    pub total_extracted_units: u64,
    pub groups: Vec<String>,
}

impl From<&PreflightReport> for PreflightSummary {
    fn from(r: &PreflightReport) -> Self {
        Self {
            total_units: r.total_units,
            outputs: r.groups.len(),
            total_extracted_units: r.total_extracted_units,
            groups: r.groups.iter().map(|g| g.label.clone()).collect(),
        }
    }
}

/// Status snapshot of one phase of one job. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub job_id: String,
    pub phase: Phase,
    pub status: PhaseStatus,
    pub counts: Counts,
    pub progress: u8,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    /// Set when the phase failed before any item was scheduled.
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub finalize_round: u32,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight: Option<PreflightSummary>,
}

impl PhaseState {
    /// Sentinel for a phase that has never been started.
    pub fn pending(job_id: &str, phase: Phase) -> Self {
        Self {
            job_id: job_id.to_string(),
            phase,
            status: PhaseStatus::Pending,
            counts: Counts::default(),
            progress: 0,
            error: None,
            error_code: None,
            fatal: false,
            finalize_round: 0,
            started_at: None,
            finished_at: None,
            updated_at: 0,
            preflight: None,
        }
    }

    pub fn running(job_id: &str, phase: Phase, total: u32) -> Self {
        let now = unix_millis();
        Self {
            status: PhaseStatus::Running,
            counts: Counts {
                total,
                ..Counts::default()
            },
            started_at: Some(now),
            updated_at: now,
            ..Self::pending(job_id, phase)
        }
    }

    /// Phase failed before fan-out; the finalizer converges on it immediately.
    pub fn fatal(job_id: &str, phase: Phase, code: &str, message: impl Into<String>) -> Self {
        let now = unix_millis();
        Self {
            status: PhaseStatus::Failed,
            error: Some(message.into()),
            error_code: Some(code.to_string()),
            fatal: true,
            started_at: Some(now),
            finished_at: Some(now),
            updated_at: now,
            ..Self::pending(job_id, phase)
        }
    }

    pub fn set_counts(&mut self, counts: Counts) {
        self.counts = counts;
        self.progress = counts.progress();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemResult {
    Success,
    Failed,
}

/// What a successful item produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputRef {
    Artifact {
        path: PathBuf,
        bytes: u64,
        sha256: String,
    },
    Remote {
        remote_id: String,
        remote_link: String,
    },
}

/// Terminal outcome of one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub index: u32,
    pub result: ItemResult,
    pub attempts: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<OutputRef>,
    pub finished_at: i64,
}

impl ItemRecord {
    pub fn success(index: u32, attempts: u32, output: OutputRef) -> Self {
        Self {
            index,
            result: ItemResult::Success,
            attempts,
            error: None,
            output: Some(output),
            finished_at: unix_millis(),
        }
    }

    pub fn failed(index: u32, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            index,
            result: ItemResult::Failed,
            attempts,
            error: Some(error.into()),
            output: None,
            finished_at: unix_millis(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == ItemResult::Success
    }
}
