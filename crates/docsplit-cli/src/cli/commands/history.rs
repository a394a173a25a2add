//! `docsplit history <job>` – phase attempts with counts and durations.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::Engine;

use crate::cli::output::{print_json, report};

pub async fn run_history(cfg: &DocsplitConfig, job_id: &str) -> Result<()> {
    let (engine, _queue) = Engine::open(cfg).await?;
    let steps = engine.steps(job_id).await.map_err(report)?;
    print_json(&steps)
}
