//! Operations exposed to callers: submit, start/retry, poll, history.

use anyhow::Context;
use std::time::Duration;

use super::{Engine, SubmitRequest};
use crate::admission;
use crate::aggregate::live_state;
use crate::error::{EngineError, OrchestrationError};
use crate::job_db::{JobRecord, JobStatus, NewJob, StepRecord};
use crate::phase::{Phase, PhaseStatus};
use crate::queue::{Task, TaskHandle};
use crate::state_store::{validate_job_id, ObjectKey, PhaseState};

impl Engine {
    /// Admit and persist a new job, then enqueue its preflight. Returns the job id.
    pub async fn submit(&self, request: SubmitRequest) -> Result<String, EngineError> {
        let job_id = uuid::Uuid::new_v4().simple().to_string();
        let new = NewJob {
            job_id: job_id.clone(),
            run_mode: request.run_mode,
            source_name: request
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        };
        admission::admit_new(&self.db, &new, self.settings.admission)
            .await?
            .into_result()?;

        if let Err(e) = self.store.put(&job_id, ObjectKey::Request, &request) {
            let msg = format!("{:#}", e);
            self.db
                .finish_job(&job_id, JobStatus::Failed, Some("internal"), Some(&msg))
                .await?;
            return Err(e.context("persist request").into());
        }

        tracing::info!(job_id = %job_id, source = %request.source.display(), "job submitted");
        self.begin_or_release(&job_id, Phase::Preflight).await?;
        Ok(job_id)
    }

    /// Start `phase` of an existing job. The predecessor phase must have
    /// succeeded, the phase itself must not be RUNNING, and the job must pass
    /// admission (a RUNNING job keeps its slot).
    pub async fn start_phase(&self, job_id: &str, phase: Phase) -> Result<TaskHandle, EngineError> {
        validate_job_id(job_id)?;
        let job = self.require_job(job_id).await?;

        // A job RUNNING on this phase already has its fan-out and finalizer in flight.
        if job.status == JobStatus::Running && job.phase == phase {
            return Err(OrchestrationError::PhaseRunning {
                job_id: job_id.to_string(),
                phase,
            }
            .into());
        }

        if let Some(predecessor) = phase.predecessor() {
            let pred = self.store.read_state(job_id, predecessor)?;
            if pred.status != PhaseStatus::Success {
                return Err(OrchestrationError::PredecessorNotSucceeded {
                    phase,
                    predecessor,
                    status: pred.status,
                }
                .into());
            }
        }

        admission::admit_existing(&self.db, job_id, job.run_mode, phase, self.settings.admission)
            .await?
            .into_result()?;
        Ok(self.begin_or_release(job_id, phase).await?)
    }

    /// Re-run a converged phase. Items that already succeeded are skipped and
    /// the manifest is reused, so only missing and failed items execute again.
    pub async fn retry_phase(&self, job_id: &str, phase: Phase) -> Result<TaskHandle, EngineError> {
        tracing::info!(job_id, phase = %phase, "retrying phase");
        self.start_phase(job_id, phase).await
    }

    /// Current state of a phase. Safe to call at any frequency; counts are
    /// live while the phase is RUNNING.
    pub async fn phase_state(&self, job_id: &str, phase: Phase) -> Result<PhaseState, EngineError> {
        validate_job_id(job_id)?;
        self.require_job(job_id).await?;
        Ok(live_state(&self.store, job_id, phase)?)
    }

    pub async fn job(&self, job_id: &str) -> Result<JobRecord, EngineError> {
        validate_job_id(job_id)?;
        self.require_job(job_id).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobRecord>, EngineError> {
        Ok(self.db.list_jobs().await?)
    }

    /// Phase attempts of a job, oldest first.
    pub async fn steps(&self, job_id: &str) -> Result<Vec<StepRecord>, EngineError> {
        validate_job_id(job_id)?;
        self.require_job(job_id).await?;
        Ok(self.db.list_steps(job_id).await?)
    }

    /// Re-enqueue work for jobs left RUNNING by a previous process.
    ///
    /// Phases still RUNNING are scheduled again (manifests are reused and
    /// finished items skipped); converged phases get a finalizer so the job
    /// bookkeeping completes. Returns the number of jobs resumed.
    pub async fn recover_running(&self) -> Result<usize, EngineError> {
        let running = self.db.list_running().await?;
        for job in &running {
            let state = self.store.read_state(&job.job_id, job.phase)?;
            let task = if state.status.is_terminal() {
                Task::Finalize {
                    job_id: job.job_id.clone(),
                    phase: job.phase,
                    round: 1,
                }
            } else if job.phase == Phase::Preflight {
                Task::Preflight {
                    job_id: job.job_id.clone(),
                }
            } else {
                Task::SchedulePhase {
                    job_id: job.job_id.clone(),
                    phase: job.phase,
                }
            };
            tracing::info!(job_id = %job.job_id, phase = %job.phase, task = task.name(), "resuming job");
            self.queue.enqueue(task, Duration::ZERO).await?;
        }
        Ok(running.len())
    }

    async fn require_job(&self, job_id: &str) -> Result<JobRecord, EngineError> {
        self.db
            .get_job(job_id)
            .await?
            .ok_or_else(|| OrchestrationError::UnknownJob(job_id.to_string()).into())
    }

    /// `begin_phase` for a job that was just admitted. If the phase cannot be
    /// started the job is failed, so it neither looks stuck nor keeps its slot.
    async fn begin_or_release(&self, job_id: &str, phase: Phase) -> anyhow::Result<TaskHandle> {
        match self.begin_phase(job_id, phase).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                if let Err(release) = self.abort_job(job_id, phase, &e).await {
                    tracing::error!(job_id, phase = %phase, "could not release job: {:#}", release);
                }
                Err(e)
            }
        }
    }

    /// Open the step, mark the phase RUNNING and enqueue its first task.
    /// The job must already hold an admission slot.
    pub(super) async fn begin_phase(&self, job_id: &str, phase: Phase) -> anyhow::Result<TaskHandle> {
        self.db.set_phase(job_id, phase).await?;
        self.db.open_step(job_id, phase, 0).await?;
        self.store
            .write_state(&PhaseState::running(job_id, phase, 0))
            .with_context(|| format!("write {} state", phase))?;
        let task = match phase {
            Phase::Preflight => Task::Preflight {
                job_id: job_id.to_string(),
            },
            _ => Task::SchedulePhase {
                job_id: job_id.to_string(),
                phase,
            },
        };
        tracing::info!(job_id, phase = %phase, "phase started");
        self.queue.enqueue(task, Duration::ZERO).await
    }
}
