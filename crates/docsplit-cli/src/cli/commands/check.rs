//! `docsplit check <source> --ranges ..` – offline preflight.

use anyhow::Result;
use docsplit_core::collab::TextPagesExtractor;
use docsplit_core::config::DocsplitConfig;
use docsplit_core::preflight;
use serde_json::json;
use std::path::Path;

use crate::cli::output::print_json;

pub async fn run_check(cfg: &DocsplitConfig, source: &Path, ranges: &str) -> Result<()> {
    let limits = cfg.preflight_limits();
    let source = source.to_path_buf();
    let ranges = ranges.to_string();
    let verdict = tokio::task::spawn_blocking(move || {
        preflight::validate(&source, &ranges, &limits, &TextPagesExtractor::new())
    })
    .await?;
    match verdict {
        Ok(report) => print_json(&report),
        Err(err) => {
            print_json(&json!({ "error": err.to_string(), "error_code": err.code() }))?;
            Err(err.into())
        }
    }
}
