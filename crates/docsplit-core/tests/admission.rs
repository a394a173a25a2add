mod common;

use std::sync::Arc;

use common::{fast_settings, open_engine, request, write_pages, ScriptedExtractor};
use docsplit_core::admission::BUSY_MESSAGE;
use docsplit_core::collab::DirUploader;
use docsplit_core::error::EngineError;
use docsplit_core::job_db::{JobStatus, RunMode};

#[tokio::test]
async fn ceilings_reject_without_creating_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_pages(dir.path(), 4);
    let extractor = Arc::new(ScriptedExtractor::new());
    let mut settings = fast_settings(2, false);
    settings.admission.max_running_total = 2;
    settings.admission.max_running_async = 1;
    let (engine, queue) = open_engine(
        &dir.path().join("state"),
        extractor.clone(),
        Arc::new(DirUploader::new(dir.path().join("remote"))),
        settings,
    )
    .await;

    // Hold every admitted job inside preflight.
    extractor.count_gate.close();
    engine.submit(request(&src, "1-2", RunMode::Async)).await.unwrap();

    let err = engine
        .submit(request(&src, "1-2", RunMode::Async))
        .await
        .unwrap_err();
    let EngineError::Busy(busy) = err else {
        panic!("expected busy, got {:?}", err);
    };
    assert_eq!(busy.error, BUSY_MESSAGE);
    assert!(busy.busy);
    assert_eq!(busy.running_async, 1);

    // The async ceiling does not apply to sync jobs.
    engine.submit(request(&src, "3-4", RunMode::Sync)).await.unwrap();

    let err = engine
        .submit(request(&src, "1", RunMode::Sync))
        .await
        .unwrap_err();
    let EngineError::Busy(busy) = err else {
        panic!("expected busy, got {:?}", err);
    };
    assert_eq!(busy.running_total, 2);
    assert_eq!(busy.limits.max_running_total, 2);
    assert_eq!(EngineError::Busy(busy).code(), "busy");
    assert_eq!(engine.list_jobs().await.unwrap().len(), 2);

    extractor.count_gate.open();
    queue.wait_idle().await;
    let jobs = engine.list_jobs().await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Success));

    // Slots are free again once the jobs converge.
    engine.submit(request(&src, "1", RunMode::Async)).await.unwrap();
    queue.wait_idle().await;
}
