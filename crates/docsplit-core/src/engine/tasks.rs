//! Task execution: preflight, phase scheduling, chunks and finalization.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{Engine, SubmitRequest};
use crate::aggregate::{self, compute, FinalizeOutcome};
use crate::collab::DestinationRef;
use crate::error::{error_code, OrchestrationError};
use crate::job_db::{JobMetadata, JobStatus};
use crate::manifest::{build_split_manifest, build_upload_manifest, plan_chunks, Manifest};
use crate::phase::{Phase, PhaseStatus};
use crate::preflight::{self, PreflightReport};
use crate::queue::{Task, TaskRunner};
use crate::retry::{run_with_retry, CollabError};
use crate::state_store::{Counts, ObjectKey, PhaseState, PreflightSummary};

#[async_trait]
impl TaskRunner for Engine {
    async fn run_task(&self, task: Task) -> Result<()> {
        match task {
            Task::Preflight { job_id } => {
                if let Err(e) = self.run_preflight(&job_id).await {
                    self.fail_phase(&job_id, Phase::Preflight, &e).await?;
                }
                Ok(())
            }
            Task::SchedulePhase { job_id, phase } => {
                if let Err(e) = self.schedule_phase(&job_id, phase).await {
                    self.fail_phase(&job_id, phase, &e).await?;
                }
                Ok(())
            }
            Task::RunChunk {
                job_id,
                phase,
                chunk,
            } => {
                // Items left without a record are reported by the finalizer.
                self.worker.run_chunk(&job_id, phase, chunk).await?;
                Ok(())
            }
            Task::Finalize {
                job_id,
                phase,
                round,
            } => {
                if let Err(e) = self.run_finalize(&job_id, phase, round).await {
                    self.abort_job(&job_id, phase, &e).await?;
                }
                Ok(())
            }
        }
    }
}

impl Engine {
    fn request(&self, job_id: &str) -> Result<SubmitRequest> {
        self.store
            .get(job_id, ObjectKey::Request)?
            .ok_or_else(|| OrchestrationError::MissingRequest(job_id.to_string()).into())
    }

    async fn run_preflight(&self, job_id: &str) -> Result<()> {
        let request = self.request(job_id)?;
        let extractor = Arc::clone(&self.extractor);
        let limits = self.settings.limits;
        let source = request.source.clone();
        let ranges = request.page_ranges.clone();
        let verdict = tokio::task::spawn_blocking(move || {
            preflight::validate(&source, &ranges, &limits, extractor.as_ref())
        })
        .await
        .context("preflight thread")?;

        let started_at = self.store.read_state(job_id, Phase::Preflight)?.started_at;
        let state = match verdict {
            Ok(report) => {
                self.store
                    .put(job_id, ObjectKey::Manifest(Phase::Preflight), &report)?;
                self.db
                    .update_metadata(job_id, &self.metadata_for(&report))
                    .await?;
                tracing::info!(
                    job_id,
                    pages = report.total_units,
                    outputs = report.outputs(),
                    extracted = report.total_extracted_units,
                    "preflight passed"
                );
                let mut st = PhaseState::running(job_id, Phase::Preflight, 1);
                st.status = PhaseStatus::Success;
                st.set_counts(Counts {
                    total: 1,
                    done: 1,
                    failed: 0,
                });
                st.preflight = Some(PreflightSummary::from(&report));
                st
            }
            Err(invalid) => {
                tracing::warn!(job_id, code = invalid.code(), "preflight rejected: {}", invalid);
                let mut st =
                    PhaseState::fatal(job_id, Phase::Preflight, invalid.code(), invalid.to_string());
                st.set_counts(Counts {
                    total: 1,
                    done: 0,
                    failed: 1,
                });
                st
            }
        };
        let state = PhaseState {
            started_at: started_at.or(state.started_at),
            ..state
        };
        self.store.write_state(&state)?;
        self.enqueue_finalize(job_id, Phase::Preflight, 1, Duration::ZERO)
            .await
    }

    fn metadata_for(&self, report: &PreflightReport) -> JobMetadata {
        JobMetadata {
            source_bytes: Some(report.source_bytes as i64),
            page_count: Some(i64::from(report.total_units)),
            outputs_requested: Some(report.outputs() as i64),
            total_extracted_pages: Some(report.total_extracted_units as i64),
            split_chunk_size: Some(self.settings.split_chunk_size as i64),
            backend: Some(report.backend.clone()),
        }
    }

    /// Load the phase manifest, or build and store it on the first run.
    async fn load_or_build_manifest(&self, job_id: &str, phase: Phase) -> Result<Manifest> {
        if let Some(existing) = self.store.get::<Manifest>(job_id, ObjectKey::Manifest(phase))? {
            tracing::debug!(job_id, phase = %phase, items = existing.len(), "reusing manifest");
            return Ok(existing);
        }
        let built = match phase {
            Phase::Preflight => anyhow::bail!("preflight has no work items"),
            Phase::Split => {
                let report: PreflightReport = self
                    .store
                    .get(job_id, ObjectKey::Manifest(Phase::Preflight))?
                    .ok_or_else(|| OrchestrationError::MissingManifest {
                        job_id: job_id.to_string(),
                        phase: Phase::Preflight,
                    })?;
                build_split_manifest(job_id, &report)
            }
            Phase::Upload => {
                let split: Manifest = self
                    .store
                    .get(job_id, ObjectKey::Manifest(Phase::Split))?
                    .ok_or_else(|| OrchestrationError::MissingManifest {
                        job_id: job_id.to_string(),
                        phase: Phase::Split,
                    })?;
                let split_items = self.store.list_items(job_id, Phase::Split)?;
                let destination = self.resolve_destination(job_id).await?;
                build_upload_manifest(job_id, &split, &split_items, destination)
            }
        };
        self.store
            .put_once(job_id, ObjectKey::Manifest(phase), built)
    }

    async fn resolve_destination(&self, job_id: &str) -> Result<DestinationRef> {
        let request = self.request(job_id)?;
        let outcome = run_with_retry(&self.settings.retry, |_| {
            let uploader = Arc::clone(&self.uploader);
            let path = request.destination.clone();
            async move {
                match tokio::task::spawn_blocking(move || uploader.resolve_destination(&path, true))
                    .await
                {
                    Ok(r) => r,
                    Err(e) => Err(CollabError::permanent(format!(
                        "destination thread failed: {}",
                        e
                    ))),
                }
            }
        })
        .await;
        outcome
            .result
            .map_err(|e| OrchestrationError::DestinationUnavailable(e.message).into())
    }

    async fn schedule_phase(&self, job_id: &str, phase: Phase) -> Result<()> {
        let manifest = self.load_or_build_manifest(job_id, phase).await?;
        let chunk_size = match phase {
            Phase::Upload => self.settings.upload_chunk_size,
            _ => self.settings.split_chunk_size,
        };
        let chunks = plan_chunks(manifest.len(), chunk_size);

        let previous = self.store.read_state(job_id, phase)?;
        let mut state = PhaseState::running(job_id, phase, manifest.len());
        state.started_at = previous.started_at.or(state.started_at);
        let records = self.store.list_items(job_id, phase)?;
        state.set_counts(compute(manifest.len(), &records).counts);
        self.store.write_state(&state)?;

        if phase == Phase::Split {
            if let Some(job) = self.db.get_job(job_id).await? {
                let mut meta = job.metadata;
                meta.split_chunk_size = Some(chunk_size.max(1) as i64);
                self.db.update_metadata(job_id, &meta).await?;
            }
        }

        tracing::info!(
            job_id,
            phase = %phase,
            items = manifest.len(),
            chunks = chunks.len(),
            "phase scheduled"
        );
        let finalize = Task::Finalize {
            job_id: job_id.to_string(),
            phase,
            round: 1,
        };
        if chunks.is_empty() {
            self.queue.enqueue(finalize, Duration::ZERO).await?;
            return Ok(());
        }
        let tasks = chunks
            .into_iter()
            .map(|chunk| Task::RunChunk {
                job_id: job_id.to_string(),
                phase,
                chunk,
            })
            .collect();
        self.queue.enqueue_group(tasks, finalize).await?;
        Ok(())
    }

    async fn run_finalize(&self, job_id: &str, phase: Phase, round: u32) -> Result<()> {
        let outcome = aggregate::finalize(
            &self.store,
            &self.db,
            job_id,
            phase,
            round,
            self.settings.finalize_options(),
        )
        .await?;
        match outcome {
            FinalizeOutcome::Pending { round } => {
                self.enqueue_finalize(job_id, phase, round, self.settings.finalize_delay)
                    .await
            }
            FinalizeOutcome::Converged { .. } => Ok(()),
            FinalizeOutcome::Advance { next } => {
                if let Err(e) = self.begin_phase(job_id, next).await {
                    self.abort_job(job_id, next, &e).await?;
                }
                Ok(())
            }
        }
    }

    async fn enqueue_finalize(
        &self,
        job_id: &str,
        phase: Phase,
        round: u32,
        delay: Duration,
    ) -> Result<()> {
        self.queue
            .enqueue(
                Task::Finalize {
                    job_id: job_id.to_string(),
                    phase,
                    round,
                },
                delay,
            )
            .await?;
        Ok(())
    }

    fn fatal_state(&self, job_id: &str, phase: Phase, err: &anyhow::Error) -> PhaseState {
        let started_at = self
            .store
            .read_state(job_id, phase)
            .ok()
            .and_then(|s| s.started_at);
        let state = PhaseState::fatal(job_id, phase, error_code(err), format!("{:#}", err));
        PhaseState {
            started_at: started_at.or(state.started_at),
            ..state
        }
    }

    /// A phase failed before fan-out: record it and let the finalizer converge.
    async fn fail_phase(&self, job_id: &str, phase: Phase, err: &anyhow::Error) -> Result<()> {
        tracing::error!(job_id, phase = %phase, code = error_code(err), "phase failed: {:#}", err);
        self.store.write_state(&self.fatal_state(job_id, phase, err))?;
        self.enqueue_finalize(job_id, phase, 1, Duration::ZERO).await
    }

    /// Close the books directly, without a finalizer: the phase could not be
    /// started, or the finalizer itself failed. The job row is always updated
    /// even when the state store is the thing that broke.
    pub(super) async fn abort_job(&self, job_id: &str, phase: Phase, err: &anyhow::Error) -> Result<()> {
        tracing::error!(job_id, phase = %phase, code = error_code(err), "job aborted: {:#}", err);
        let state = self.fatal_state(job_id, phase, err);
        if let Err(e) = self.store.write_state(&state) {
            tracing::warn!(job_id, phase = %phase, "could not record fatal state: {:#}", e);
        }
        self.db
            .close_step(
                job_id,
                phase,
                PhaseStatus::Failed,
                state.counts,
                state.error_code.as_deref(),
                state.error.as_deref(),
            )
            .await?;
        self.db
            .finish_job(
                job_id,
                JobStatus::Failed,
                state.error_code.as_deref(),
                state.error.as_deref(),
            )
            .await
    }
}
