//! Phase finalizer: recompute the aggregate, converge, close the books.

use anyhow::Result;

use super::compute;
use crate::error::OrchestrationError;
use crate::job_db::{unix_millis, JobDb, JobStatus};
use crate::manifest::Manifest;
use crate::phase::{Phase, PhaseStatus};
use crate::state_store::{ObjectKey, PhaseState, StateStore};

#[derive(Debug, Clone, Copy)]
pub struct FinalizeOptions {
    /// Rounds after which missing item records are given up on.
    pub max_rounds: u32,
    /// Start the next phase when this one succeeds.
    pub auto_advance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Items still outstanding; run the finalizer again as `round`.
    Pending { round: u32 },
    /// Phase converged and the job left RUNNING with `status`.
    Converged { status: PhaseStatus },
    /// Phase succeeded; the job stays RUNNING and `next` should start.
    Advance { next: Phase },
}

fn load_manifest(store: &StateStore, job_id: &str, phase: Phase) -> Result<Option<Manifest>> {
    store.get(job_id, ObjectKey::Manifest(phase))
}

/// One finalizer round for `phase` of `job_id`.
pub async fn finalize(
    store: &StateStore,
    db: &JobDb,
    job_id: &str,
    phase: Phase,
    round: u32,
    opts: FinalizeOptions,
) -> Result<FinalizeOutcome> {
    let mut state = store.read_state(job_id, phase)?;

    // Preflight state is written by the validator itself, and a fatal
    // failure means nothing was ever scheduled: both converge as stored.
    if phase == Phase::Preflight || (state.fatal && state.status == PhaseStatus::Failed) {
        if state.status.is_terminal() {
            return converge(store, db, state, opts).await;
        }
    } else {
        let Some(manifest) = load_manifest(store, job_id, phase)? else {
            let err = OrchestrationError::MissingManifest {
                job_id: job_id.to_string(),
                phase,
            };
            tracing::error!(job_id, phase = %phase, "{}", err);
            let state = PhaseState {
                started_at: state.started_at,
                ..PhaseState::fatal(job_id, phase, err.code(), err.to_string())
            };
            return converge(store, db, state, opts).await;
        };

        let mut records = Vec::with_capacity(manifest.items.len());
        for item in &manifest.items {
            if let Some(rec) = store.item(job_id, phase, item.index)? {
                records.push(rec);
            }
        }
        let agg = compute(manifest.len(), &records);
        state.set_counts(agg.counts);
        state.status = agg.status;
        if agg.status != PhaseStatus::Running {
            if agg.counts.total == 0 {
                state.error = Some("nothing to process: the manifest is empty".to_string());
                state.error_code = Some("empty_manifest".to_string());
            } else if agg.counts.failed > 0 {
                state.error = Some(format!(
                    "{} of {} item(s) failed",
                    agg.counts.failed, agg.counts.total
                ));
            }
            state.finalize_round = round;
            return converge(store, db, state, opts).await;
        }
    }

    // Not converged yet.
    let missing = state.counts.total.saturating_sub(state.counts.finished());
    state.finalize_round = round;
    state.updated_at = unix_millis();
    if round >= opts.max_rounds {
        tracing::warn!(job_id, phase = %phase, round, missing, "finalizer giving up");
        state.status = PhaseStatus::Failed;
        state.error = Some(format!("finalize gave up: {} item(s) never reported", missing));
        state.error_code = Some("finalize_timeout".to_string());
        return converge(store, db, state, opts).await;
    }

    if state.status != PhaseStatus::Running {
        state.status = PhaseStatus::Running;
    }
    store.write_state(&state)?;
    tracing::debug!(job_id, phase = %phase, round, missing, "phase not converged yet");
    Ok(FinalizeOutcome::Pending { round: round + 1 })
}

async fn converge(
    store: &StateStore,
    db: &JobDb,
    mut state: PhaseState,
    opts: FinalizeOptions,
) -> Result<FinalizeOutcome> {
    let now = unix_millis();
    state.finished_at.get_or_insert(now);
    state.updated_at = now;
    store.write_state(&state)?;

    let job_id = state.job_id.as_str();
    db.close_step(
        job_id,
        state.phase,
        state.status,
        state.counts,
        state.error_code.as_deref(),
        state.error.as_deref(),
    )
    .await?;

    tracing::info!(
        job_id,
        phase = %state.phase,
        status = %state.status,
        total = state.counts.total,
        done = state.counts.done,
        failed = state.counts.failed,
        "phase converged"
    );

    if state.status == PhaseStatus::Success && opts.auto_advance {
        if let Some(next) = state.phase.next() {
            return Ok(FinalizeOutcome::Advance { next });
        }
    }

    db.finish_job(
        job_id,
        JobStatus::from_phase(state.status),
        state.error_code.as_deref(),
        state.error.as_deref(),
    )
    .await?;
    Ok(FinalizeOutcome::Converged {
        status: state.status,
    })
}

/// Phase state for polling. While RUNNING, counts and progress are
/// recomputed from the item records present right now.
pub fn live_state(store: &StateStore, job_id: &str, phase: Phase) -> Result<PhaseState> {
    let mut state = store.read_state(job_id, phase)?;
    if state.status != PhaseStatus::Running || phase == Phase::Preflight {
        return Ok(state);
    }
    if let Some(manifest) = load_manifest(store, job_id, phase)? {
        let records = store.list_items(job_id, phase)?;
        state.set_counts(compute(manifest.len(), &records).counts);
    }
    Ok(state)
}
