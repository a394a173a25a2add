//! `docsplit submit <source> --ranges ..` – create a job and run it.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::{Engine, SubmitRequest};
use docsplit_core::job_db::RunMode;
use docsplit_core::phase::Phase;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::output::{print_json, report};

pub async fn run_submit(
    mut cfg: DocsplitConfig,
    source: PathBuf,
    ranges: String,
    dest: String,
    manual: bool,
    run_mode: RunMode,
) -> Result<()> {
    if manual {
        cfg.auto_advance = false;
    }
    let (engine, queue) = Engine::open(&cfg).await?;
    let source = std::fs::canonicalize(&source).unwrap_or(source);
    let job_id = engine
        .submit(SubmitRequest {
            source,
            page_ranges: ranges,
            destination: dest,
            run_mode,
        })
        .await
        .map_err(report)?;
    queue.wait_idle().await;

    let job = engine.job(&job_id).await.map_err(report)?;
    let mut phases = serde_json::Map::new();
    for phase in Phase::ALL {
        let state = engine.phase_state(&job_id, phase).await.map_err(report)?;
        phases.insert(phase.as_str().to_string(), serde_json::to_value(state)?);
    }
    print_json(&json!({ "job_id": job_id, "job": job, "phases": phases }))
}
