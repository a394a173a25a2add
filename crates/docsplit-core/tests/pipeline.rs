mod common;

use std::fs;
use std::sync::Arc;

use common::{fast_settings, open_engine, request, write_pages, ScriptedExtractor};
use docsplit_core::collab::DirUploader;
use docsplit_core::job_db::{JobStatus, RunMode};
use docsplit_core::manifest::plan_chunks;
use docsplit_core::phase::{Phase, PhaseStatus};
use docsplit_core::state_store::{ObjectKey, PhaseState};
use std::sync::atomic::Ordering;

/// 24 groups of nine pages plus one trailing group: 25 outputs covering 237 pages.
fn twenty_five_groups() -> String {
    let mut groups: Vec<String> = (0..24)
        .map(|i| format!("{}-{}", i * 9 + 1, i * 9 + 9))
        .collect();
    groups.push("217-237".to_string());
    groups.join("; ")
}

#[test]
fn twenty_five_outputs_plan_three_chunks() {
    let sizes: Vec<u32> = plan_chunks(25, 10).iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[tokio::test]
async fn partial_failure_then_retry_only_reruns_failures() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_pages(dir.path(), 237);
    let extractor = Arc::new(ScriptedExtractor::new().failing(&["10-18.txt", "100-108.txt"]));
    let (engine, queue) = open_engine(
        &dir.path().join("state"),
        extractor.clone(),
        Arc::new(DirUploader::new(dir.path().join("remote"))),
        fast_settings(10, true),
    )
    .await;

    let job_id = engine
        .submit(request(&src, &twenty_five_groups(), RunMode::Sync))
        .await
        .unwrap();
    queue.wait_idle().await;

    let pre = engine.phase_state(&job_id, Phase::Preflight).await.unwrap();
    assert_eq!(pre.status, PhaseStatus::Success);
    let summary = pre.preflight.expect("preflight summary");
    assert_eq!(summary.total_units, 237);
    assert_eq!(summary.outputs, 25);
    assert_eq!(summary.total_extracted_units, 237);

    let split = engine.phase_state(&job_id, Phase::Split).await.unwrap();
    assert_eq!(split.status, PhaseStatus::PartialSuccess);
    assert_eq!(split.counts.total, 25);
    assert_eq!(split.counts.done, 23);
    assert_eq!(split.counts.failed, 2);
    assert_eq!(split.progress, 100);
    assert_eq!(split.error.as_deref(), Some("2 of 25 item(s) failed"));
    assert_eq!(extractor.calls(), 25);

    // Partial success does not advance.
    let upload = engine.phase_state(&job_id, Phase::Upload).await.unwrap();
    assert_eq!(upload.status, PhaseStatus::Pending);
    let job = engine.job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::PartialSuccess);
    assert_eq!(job.phase, Phase::Split);

    extractor.fail_enabled.store(false, Ordering::SeqCst);
    engine.retry_phase(&job_id, Phase::Split).await.unwrap();
    queue.wait_idle().await;

    assert_eq!(extractor.calls(), 27);
    let split = engine.phase_state(&job_id, Phase::Split).await.unwrap();
    assert_eq!(split.status, PhaseStatus::Success);
    assert_eq!(split.counts.done, 25);
    assert_eq!(split.counts.failed, 0);

    let upload = engine.phase_state(&job_id, Phase::Upload).await.unwrap();
    assert_eq!(upload.status, PhaseStatus::Success);
    assert_eq!(upload.counts.total, 25);
    let uploaded = fs::read_dir(dir.path().join("remote/exports/run"))
        .unwrap()
        .count();
    assert_eq!(uploaded, 25);
    assert_eq!(
        engine.job(&job_id).await.unwrap().status,
        JobStatus::Success
    );

    let split_steps: Vec<_> = engine
        .steps(&job_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.phase == Phase::Split)
        .collect();
    assert_eq!(split_steps.len(), 2);
    assert_eq!(split_steps[0].status, PhaseStatus::PartialSuccess);
    assert_eq!(split_steps[1].status, PhaseStatus::Success);
    assert_eq!(split_steps[1].attempt, 2);
}

#[tokio::test]
async fn interrupted_phase_resumes_without_redoing_finished_items() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let src = write_pages(dir.path(), 30);
    let ranges = "1-3; 4-6; 7-9; 10-12; 13-15; 16-18; 19-21; 22-24";

    let first = Arc::new(ScriptedExtractor::new());
    let job_id = {
        let (engine, queue) = open_engine(
            &state_dir,
            first.clone(),
            Arc::new(DirUploader::new(dir.path().join("remote"))),
            fast_settings(3, false),
        )
        .await;
        let job_id = engine.submit(request(&src, ranges, RunMode::Sync)).await.unwrap();
        queue.wait_idle().await;
        engine.start_phase(&job_id, Phase::Split).await.unwrap();
        queue.wait_idle().await;
        assert_eq!(first.calls(), 8);

        // Simulate a crash mid-phase: three items never reported, state and
        // registry still say RUNNING.
        for index in [2u32, 5, 8] {
            let path = engine
                .store()
                .path(&job_id, ObjectKey::Item(Phase::Split, index))
                .unwrap();
            fs::remove_file(path).unwrap();
        }
        engine
            .store()
            .write_state(&PhaseState::running(&job_id, Phase::Split, 8))
            .unwrap();
        assert!(engine
            .db()
            .try_mark_running(&job_id, Phase::Split, 10, 10)
            .await
            .unwrap());
        job_id
    };

    let second = Arc::new(ScriptedExtractor::new());
    let (engine, queue) = open_engine(
        &state_dir,
        second.clone(),
        Arc::new(DirUploader::new(dir.path().join("remote"))),
        fast_settings(3, false),
    )
    .await;
    assert_eq!(engine.recover_running().await.unwrap(), 1);
    queue.wait_idle().await;

    assert_eq!(second.calls(), 3);
    let split = engine.phase_state(&job_id, Phase::Split).await.unwrap();
    assert_eq!(split.status, PhaseStatus::Success);
    assert_eq!(split.counts.done, 8);
    assert_eq!(engine.job(&job_id).await.unwrap().status, JobStatus::Success);
}

#[tokio::test]
async fn leftover_temp_files_do_not_change_observed_state() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_pages(dir.path(), 6);
    let (engine, queue) = open_engine(
        &dir.path().join("state"),
        Arc::new(ScriptedExtractor::new()),
        Arc::new(DirUploader::new(dir.path().join("remote"))),
        fast_settings(2, false),
    )
    .await;
    let job_id = engine.submit(request(&src, "1-2; 3-4", RunMode::Sync)).await.unwrap();
    queue.wait_idle().await;
    engine.start_phase(&job_id, Phase::Split).await.unwrap();
    queue.wait_idle().await;

    let state_path = engine
        .store()
        .path(&job_id, ObjectKey::State(Phase::Split))
        .unwrap();
    let items_dir = engine
        .store()
        .path(&job_id, ObjectKey::Item(Phase::Split, 1))
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf();
    fs::write(state_path.with_file_name(".tmp-crashed"), b"{\"status\":").unwrap();
    fs::write(items_dir.join(".tmp-half"), b"{").unwrap();

    let split = engine.phase_state(&job_id, Phase::Split).await.unwrap();
    assert_eq!(split.status, PhaseStatus::Success);
    assert_eq!(split.counts.total, 2);
    assert_eq!(split.counts.done, 2);
    assert_eq!(engine.store().list_items(&job_id, Phase::Split).unwrap().len(), 2);
}
