//! `docsplit status <job>` – job record and phase states.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::Engine;
use docsplit_core::phase::Phase;
use serde_json::json;

use crate::cli::output::{print_json, report};

pub async fn run_status(cfg: &DocsplitConfig, job_id: &str, phase: Option<Phase>) -> Result<()> {
    let (engine, _queue) = Engine::open(cfg).await?;
    if let Some(phase) = phase {
        let state = engine.phase_state(job_id, phase).await.map_err(report)?;
        return print_json(&state);
    }

    let job = engine.job(job_id).await.map_err(report)?;
    let mut phases = serde_json::Map::new();
    for phase in Phase::ALL {
        let state = engine.phase_state(job_id, phase).await.map_err(report)?;
        phases.insert(phase.as_str().to_string(), serde_json::to_value(state)?);
    }
    print_json(&json!({ "job": job, "phases": phases }))
}
