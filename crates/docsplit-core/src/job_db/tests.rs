//! Tests for job_db (use in-memory DB helper from db).

use super::open_memory;
use super::{JobDb, JobMetadata, JobStatus, NewJob, RunMode};
use crate::phase::{Phase, PhaseStatus};
use crate::state_store::Counts;

fn new_job(id: &str, run_mode: RunMode) -> NewJob {
    NewJob {
        job_id: id.to_string(),
        run_mode,
        source_name: Some("report.txt".to_string()),
    }
}

#[tokio::test]
async fn insert_and_get_job() {
    let db = open_memory().await.unwrap();
    assert!(db
        .try_insert_running(&new_job("a1", RunMode::Async), 4, 3)
        .await
        .unwrap());
    let job = db.get_job("a1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.phase, Phase::Preflight);
    assert_eq!(job.run_mode, RunMode::Async);
    assert_eq!(job.source_name.as_deref(), Some("report.txt"));
    assert!(job.finished_at.is_none());
    assert!(db.get_job("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn insert_respects_total_ceiling() {
    let db = open_memory().await.unwrap();
    for id in ["j1", "j2"] {
        assert!(db
            .try_insert_running(&new_job(id, RunMode::Sync), 2, 2)
            .await
            .unwrap());
    }
    assert!(!db
        .try_insert_running(&new_job("j3", RunMode::Sync), 2, 2)
        .await
        .unwrap());
    assert!(db.get_job("j3").await.unwrap().is_none());

    let counts = db.running_counts().await.unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.async_jobs, 0);

    db.finish_job("j1", JobStatus::Success, None, None).await.unwrap();
    assert!(db
        .try_insert_running(&new_job("j3", RunMode::Sync), 2, 2)
        .await
        .unwrap());
}

#[tokio::test]
async fn async_ceiling_does_not_block_sync_jobs() {
    let db = open_memory().await.unwrap();
    assert!(db
        .try_insert_running(&new_job("a1", RunMode::Async), 4, 1)
        .await
        .unwrap());
    assert!(!db
        .try_insert_running(&new_job("a2", RunMode::Async), 4, 1)
        .await
        .unwrap());
    assert!(db
        .try_insert_running(&new_job("s1", RunMode::Sync), 4, 1)
        .await
        .unwrap());
    let counts = db.running_counts().await.unwrap();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.async_jobs, 1);
}

#[tokio::test]
async fn mark_running_readmits_finished_job() {
    let db = open_memory().await.unwrap();
    db.try_insert_running(&new_job("a", RunMode::Sync), 1, 1)
        .await
        .unwrap();
    // Already running: admitted without a free slot.
    assert!(db.try_mark_running("a", Phase::Split, 1, 1).await.unwrap());
    assert_eq!(db.get_job("a").await.unwrap().unwrap().phase, Phase::Split);

    db.finish_job("a", JobStatus::PartialSuccess, Some("x"), Some("two failed"))
        .await
        .unwrap();
    let finished = db.get_job("a").await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::PartialSuccess);
    assert!(finished.finished_at.is_some());
    assert!(finished.duration_ms.unwrap() >= 0);
    assert_eq!(finished.error_message.as_deref(), Some("two failed"));

    db.try_insert_running(&new_job("b", RunMode::Sync), 1, 1)
        .await
        .unwrap();
    // Slot taken by `b`: retrying `a` is rejected.
    assert!(!db.try_mark_running("a", Phase::Split, 1, 1).await.unwrap());
    db.finish_job("b", JobStatus::Success, None, None).await.unwrap();
    assert!(db.try_mark_running("a", Phase::Split, 1, 1).await.unwrap());

    let rerun = db.get_job("a").await.unwrap().unwrap();
    assert_eq!(rerun.status, JobStatus::Running);
    assert!(rerun.finished_at.is_none());
    assert!(rerun.error_message.is_none());
}

#[tokio::test]
async fn mark_running_unknown_job_is_false() {
    let db = open_memory().await.unwrap();
    assert!(!db.try_mark_running("ghost", Phase::Split, 4, 3).await.unwrap());
}

#[tokio::test]
async fn metadata_and_listing() {
    let db = open_memory().await.unwrap();
    db.try_insert_running(&new_job("first", RunMode::Sync), 4, 3)
        .await
        .unwrap();
    db.try_insert_running(&new_job("second", RunMode::Async), 4, 3)
        .await
        .unwrap();
    let meta = JobMetadata {
        source_bytes: Some(4096),
        page_count: Some(237),
        outputs_requested: Some(25),
        total_extracted_pages: Some(300),
        split_chunk_size: Some(10),
        backend: Some("text-pages".into()),
    };
    db.update_metadata("first", &meta).await.unwrap();
    assert_eq!(db.get_job("first").await.unwrap().unwrap().metadata, meta);

    let all = db.list_jobs().await.unwrap();
    assert_eq!(all.len(), 2);
    let running = db.list_running().await.unwrap();
    assert_eq!(running.len(), 2);

    db.finish_job("second", JobStatus::Failed, Some("invalid_ranges"), Some("bad"))
        .await
        .unwrap();
    let running = db.list_running().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].job_id, "first");
}

#[tokio::test]
async fn steps_open_and_close_per_attempt() {
    let db: JobDb = open_memory().await.unwrap();
    db.try_insert_running(&new_job("j", RunMode::Sync), 4, 3)
        .await
        .unwrap();
    assert_eq!(db.open_step("j", Phase::Split, 5).await.unwrap(), 1);
    db.close_step(
        "j",
        Phase::Split,
        PhaseStatus::PartialSuccess,
        Counts { total: 5, done: 4, failed: 1 },
        None,
        None,
    )
    .await
    .unwrap();
    assert_eq!(db.open_step("j", Phase::Split, 5).await.unwrap(), 2);
    db.close_step(
        "j",
        Phase::Split,
        PhaseStatus::Success,
        Counts { total: 5, done: 5, failed: 0 },
        None,
        None,
    )
    .await
    .unwrap();

    // Closing again does not rewrite a finished attempt.
    db.close_step(
        "j",
        Phase::Split,
        PhaseStatus::Failed,
        Counts { total: 5, done: 0, failed: 5 },
        Some("late"),
        None,
    )
    .await
    .unwrap();

    let steps = db.list_steps("j").await.unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].attempt, 1);
    assert_eq!(steps[0].status, PhaseStatus::PartialSuccess);
    assert_eq!(steps[0].failed, 1);
    assert_eq!(steps[1].attempt, 2);
    assert_eq!(steps[1].status, PhaseStatus::Success);
    assert_eq!(steps[1].done, 5);
    assert!(steps[1].finished_at.is_some());
}

#[tokio::test]
async fn open_at_creates_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = JobDb::open_in(dir.path().join("state dir")).await.unwrap();
    db.try_insert_running(&new_job("x", RunMode::Sync), 4, 3)
        .await
        .unwrap();
    assert!(dir.path().join("state dir").join("jobs.db").exists());
}
