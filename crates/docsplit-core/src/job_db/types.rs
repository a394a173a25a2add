//! Types used by the job registry.

use serde::Serialize;

use crate::phase::{Phase, PhaseStatus};

/// Job status stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Success,
    PartialSuccess,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::PartialSuccess => "partial_success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "success" => JobStatus::Success,
            "partial_success" => JobStatus::PartialSuccess,
            _ => JobStatus::Failed,
        }
    }

    /// Job status that mirrors a converged phase outcome.
    pub fn from_phase(status: PhaseStatus) -> Self {
        match status {
            PhaseStatus::Pending | PhaseStatus::Running => JobStatus::Running,
            PhaseStatus::Success => JobStatus::Success,
            PhaseStatus::PartialSuccess => JobStatus::PartialSuccess,
            PhaseStatus::Failed => JobStatus::Failed,
        }
    }
}

/// How the job was submitted. Async jobs have their own, lower admission ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    Async,
    Sync,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Async => "async",
            RunMode::Sync => "sync",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "sync" => RunMode::Sync,
            _ => RunMode::Async,
        }
    }
}

/// Row to insert on submission.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub run_mode: RunMode,
    pub source_name: Option<String>,
}

/// Metadata filled in once preflight has inspected the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobMetadata {
    pub source_bytes: Option<i64>,
    pub page_count: Option<i64>,
    pub outputs_requested: Option<i64>,
    pub total_extracted_pages: Option<i64>,
    pub split_chunk_size: Option<i64>,
    pub backend: Option<String>,
}

/// Full job row. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub phase: Phase,
    pub status: JobStatus,
    pub run_mode: RunMode,
    pub source_name: Option<String>,
    pub metadata: JobMetadata,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
}

/// One attempt at one phase of a job.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub id: i64,
    pub job_id: String,
    pub phase: Phase,
    pub attempt: i64,
    pub status: PhaseStatus,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub total: i64,
    pub done: i64,
    pub failed: i64,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// Jobs currently holding an admission slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunningCounts {
    pub total: usize,
    pub async_jobs: usize,
}
