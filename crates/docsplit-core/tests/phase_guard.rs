mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_settings, open_engine, request, write_pages, ScriptedExtractor};
use docsplit_core::collab::DirUploader;
use docsplit_core::error::{EngineError, OrchestrationError};
use docsplit_core::job_db::{JobStatus, RunMode};
use docsplit_core::phase::{Phase, PhaseStatus};

#[tokio::test]
async fn retry_while_running_is_rejected_and_upload_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_pages(dir.path(), 4);
    let extractor = Arc::new(ScriptedExtractor::new());
    let (engine, queue) = open_engine(
        &dir.path().join("state"),
        extractor.clone(),
        Arc::new(DirUploader::new(dir.path().join("remote"))),
        fast_settings(2, true),
    )
    .await;

    extractor.extract_gate.close();
    let job_id = engine
        .submit(request(&src, "1;2;3;4", RunMode::Sync))
        .await
        .unwrap();

    let mut waited = Duration::ZERO;
    loop {
        let split = engine.phase_state(&job_id, Phase::Split).await.unwrap();
        if split.status == PhaseStatus::Running {
            break;
        }
        assert!(waited < Duration::from_secs(10), "split never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    let err = engine.retry_phase(&job_id, Phase::Split).await.unwrap_err();
    assert_eq!(err.code(), "phase_running");
    assert!(
        matches!(
            err,
            EngineError::Orchestration(OrchestrationError::PhaseRunning { phase: Phase::Split, .. })
        ),
        "unexpected error: {:?}",
        err
    );

    extractor.extract_gate.open();
    queue.wait_idle().await;

    assert_eq!(extractor.calls(), 4);
    let steps = engine.steps(&job_id).await.unwrap();
    let split_steps = steps.iter().filter(|s| s.phase == Phase::Split).count();
    let upload_steps = steps.iter().filter(|s| s.phase == Phase::Upload).count();
    assert_eq!(split_steps, 1);
    assert_eq!(upload_steps, 1);
    assert!(steps.iter().all(|s| s.status == PhaseStatus::Success));

    let job = engine.job(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.phase, Phase::Upload);

    // Once converged the phase can be retried again.
    engine.retry_phase(&job_id, Phase::Split).await.unwrap();
    queue.wait_idle().await;
    assert_eq!(extractor.calls(), 4);
}
