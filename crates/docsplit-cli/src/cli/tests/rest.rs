//! Tests for status, start, retry, list, history, resume.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use docsplit_core::phase::Phase;

#[test]
fn cli_parse_status() {
    match parse(&["docsplit", "status", "abc123"]) {
        CliCommand::Status { job, phase } => {
            assert_eq!(job, "abc123");
            assert!(phase.is_none());
        }
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_status_phase_case_insensitive() {
    match parse(&["docsplit", "status", "abc123", "--phase", "Split"]) {
        CliCommand::Status { phase, .. } => assert_eq!(phase, Some(Phase::Split)),
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_start_and_retry() {
    match parse(&["docsplit", "start", "j1", "upload"]) {
        CliCommand::Start { job, phase } => {
            assert_eq!(job, "j1");
            assert_eq!(phase, Phase::Upload);
        }
        _ => panic!("expected Start"),
    }
    match parse(&["docsplit", "retry", "j1", "SPLIT"]) {
        CliCommand::Retry { phase, .. } => assert_eq!(phase, Phase::Split),
        _ => panic!("expected Retry"),
    }
}

#[test]
fn cli_rejects_unknown_phase() {
    assert!(Cli::try_parse_from(["docsplit", "start", "j1", "merge"]).is_err());
}

#[test]
fn cli_parse_list_history_resume() {
    assert!(matches!(parse(&["docsplit", "list"]), CliCommand::List));
    assert!(matches!(parse(&["docsplit", "resume"]), CliCommand::Resume));
    match parse(&["docsplit", "history", "j9"]) {
        CliCommand::History { job } => assert_eq!(job, "j9"),
        _ => panic!("expected History"),
    }
}
