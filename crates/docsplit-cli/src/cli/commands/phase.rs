//! `docsplit start|retry <job> <phase>` – run one phase of an existing job.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::Engine;
use docsplit_core::phase::Phase;

use crate::cli::output::{print_json, report};

pub async fn run_start(cfg: &DocsplitConfig, job_id: &str, phase: Phase) -> Result<()> {
    let (engine, queue) = Engine::open(cfg).await?;
    let handle = engine.start_phase(job_id, phase).await.map_err(report)?;
    tracing::debug!(task_id = %handle.id, "phase enqueued");
    queue.wait_idle().await;
    let state = engine.phase_state(job_id, phase).await.map_err(report)?;
    print_json(&state)
}

pub async fn run_retry(cfg: &DocsplitConfig, job_id: &str, phase: Phase) -> Result<()> {
    let (engine, queue) = Engine::open(cfg).await?;
    engine.retry_phase(job_id, phase).await.map_err(report)?;
    queue.wait_idle().await;
    let state = engine.phase_state(job_id, phase).await.map_err(report)?;
    print_json(&state)
}
