//! CLI for the docsplit engine.
//!
//! Every command opens the local state directory and drives the in-process
//! queue until it is idle, so a command returns once its work has converged.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docsplit_core::config;
use docsplit_core::job_db::RunMode;
use docsplit_core::phase::Phase;
use std::path::PathBuf;

use commands::{
    run_check, run_history, run_list, run_resume, run_retry, run_start, run_status, run_submit,
};

/// Top-level CLI for docsplit.
#[derive(Debug, Parser)]
#[command(name = "docsplit")]
#[command(about = "docsplit: split a document into page ranges and upload the outputs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Submit a new job: preflight, split and upload.
    Submit {
        /// Source document.
        source: PathBuf,

        /// Page ranges, e.g. "1-4, 9; 10-12" (one output per ';' group).
        #[arg(long, short = 'r')]
        ranges: String,

        /// Destination folder on the remote store.
        #[arg(long, default_value = "docsplit")]
        dest: String,

        /// Stop after each phase instead of advancing automatically.
        #[arg(long)]
        manual: bool,

        /// Submit under the async admission ceiling.
        #[arg(long = "async")]
        run_async: bool,
    },

    /// Show a job and its phase states as JSON.
    Status {
        /// Job identifier.
        job: String,

        /// Only show this phase (preflight, split, upload).
        #[arg(long, value_parser = parse_phase)]
        phase: Option<Phase>,
    },

    /// Start a phase of an existing job (its predecessor must have succeeded).
    Start {
        /// Job identifier.
        job: String,

        /// Phase to start.
        #[arg(value_parser = parse_phase)]
        phase: Phase,
    },

    /// Re-run a phase; items that already succeeded are skipped.
    Retry {
        /// Job identifier.
        job: String,

        /// Phase to re-run.
        #[arg(value_parser = parse_phase)]
        phase: Phase,
    },

    /// List all jobs.
    List,

    /// Show the phase attempts of a job.
    History {
        /// Job identifier.
        job: String,
    },

    /// Continue jobs left running by an interrupted process.
    Resume,

    /// Validate a source and page ranges without creating a job.
    Check {
        /// Source document.
        source: PathBuf,

        /// Page ranges to validate.
        #[arg(long, short = 'r')]
        ranges: String,
    },
}

fn parse_phase(s: &str) -> Result<Phase, String> {
    Phase::parse(s).ok_or_else(|| format!("unknown phase '{}' (expected preflight, split or upload)", s))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!(worker_slots = cfg.worker_slots, auto_advance = cfg.auto_advance, "loaded config");

        match cli.command {
            CliCommand::Submit {
                source,
                ranges,
                dest,
                manual,
                run_async,
            } => {
                let run_mode = if run_async { RunMode::Async } else { RunMode::Sync };
                run_submit(cfg, source, ranges, dest, manual, run_mode).await?
            }
            CliCommand::Status { job, phase } => run_status(&cfg, &job, phase).await?,
            CliCommand::Start { job, phase } => run_start(&cfg, &job, phase).await?,
            CliCommand::Retry { job, phase } => run_retry(&cfg, &job, phase).await?,
            CliCommand::List => run_list(&cfg).await?,
            CliCommand::History { job } => run_history(&cfg, &job).await?,
            CliCommand::Resume => run_resume(&cfg).await?,
            CliCommand::Check { source, ranges } => run_check(&cfg, &source, &ranges).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
