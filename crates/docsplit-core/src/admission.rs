//! Admission control: a hard ceiling on concurrently RUNNING jobs.
//!
//! Checks never block and never queue; a request over the ceiling is rejected
//! with the current counts so the caller can try again later.

use anyhow::Result;
use serde::Serialize;

use crate::job_db::{JobDb, NewJob, RunMode, RunningCounts};
use crate::phase::Phase;

pub const BUSY_MESSAGE: &str = "System is busy. Please try again in a few minutes.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub max_running_total: usize,
    pub max_running_async: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_running_total: 4,
            max_running_async: 3,
        }
    }
}

/// Rejection payload: what is running now and the ceilings that apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{error}")]
pub struct AdmissionRejected {
    pub error: &'static str,
    pub busy: bool,
    pub running_total: usize,
    pub running_async: usize,
    pub limits: Limits,
}

impl AdmissionRejected {
    fn new(counts: RunningCounts, limits: Limits) -> Self {
        Self {
            error: BUSY_MESSAGE,
            busy: true,
            running_total: counts.total,
            running_async: counts.async_jobs,
            limits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(AdmissionRejected),
}

impl Admission {
    pub fn into_result(self) -> Result<(), AdmissionRejected> {
        match self {
            Admission::Admitted => Ok(()),
            Admission::Rejected(r) => Err(r),
        }
    }
}

/// Admit a new job: inserts it as RUNNING if there is room.
pub async fn admit_new(db: &JobDb, job: &NewJob, limits: Limits) -> Result<Admission> {
    if db
        .try_insert_running(job, limits.max_running_total, limits.max_running_async)
        .await?
    {
        tracing::info!(job_id = %job.job_id, run_mode = job.run_mode.as_str(), "job admitted");
        return Ok(Admission::Admitted);
    }
    reject(db, &job.job_id, job.run_mode, limits).await
}

/// Admit an existing job into `phase`. A job that is already RUNNING keeps its slot.
pub async fn admit_existing(
    db: &JobDb,
    job_id: &str,
    run_mode: RunMode,
    phase: Phase,
    limits: Limits,
) -> Result<Admission> {
    if db
        .try_mark_running(job_id, phase, limits.max_running_total, limits.max_running_async)
        .await?
    {
        return Ok(Admission::Admitted);
    }
    reject(db, job_id, run_mode, limits).await
}

async fn reject(db: &JobDb, job_id: &str, run_mode: RunMode, limits: Limits) -> Result<Admission> {
    let counts = db.running_counts().await?;
    tracing::warn!(
        job_id,
        run_mode = run_mode.as_str(),
        running_total = counts.total,
        running_async = counts.async_jobs,
        "admission rejected"
    );
    Ok(Admission::Rejected(AdmissionRejected::new(counts, limits)))
}
