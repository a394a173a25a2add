//! `docsplit list` – all jobs, newest first.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::Engine;

use crate::cli::output::{print_json, report};

pub async fn run_list(cfg: &DocsplitConfig) -> Result<()> {
    let (engine, _queue) = Engine::open(cfg).await?;
    let jobs = engine.list_jobs().await.map_err(report)?;
    print_json(&jobs)
}
