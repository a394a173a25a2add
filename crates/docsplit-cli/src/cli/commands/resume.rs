//! `docsplit resume` – continue jobs an interrupted process left running.

use anyhow::Result;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::engine::Engine;
use serde_json::json;

use crate::cli::output::{print_json, report};

pub async fn run_resume(cfg: &DocsplitConfig) -> Result<()> {
    let (engine, queue) = Engine::open(cfg).await?;
    let resumed = engine.recover_running().await.map_err(report)?;
    queue.wait_idle().await;
    print_json(&json!({ "resumed": resumed }))
}
