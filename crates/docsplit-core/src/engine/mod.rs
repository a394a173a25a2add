//! Public engine API and phase sequencer.
//!
//! `Engine` owns the state store, the job registry and the collaborators, and
//! executes queue tasks. It keeps no in-memory job state: every decision is
//! made from what `StateStore` and `JobDb` hold.

mod api;
mod tasks;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::admission;
use crate::aggregate::FinalizeOptions;
use crate::collab::{DirUploader, Extractor, TextPagesExtractor, Uploader, WebDavUploader};
use crate::config::{DocsplitConfig, UploadTarget};
use crate::job_db::{JobDb, RunMode};
use crate::preflight;
use crate::queue::{LocalQueue, TaskQueue, TaskRunner};
use crate::retry::RetryPolicy;
use crate::state_store::StateStore;
use crate::worker::Worker;

/// Submission inputs, persisted so later phases can reuse them by job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub source: PathBuf,
    pub page_ranges: String,
    /// Destination folder path on the remote store.
    pub destination: String,
    pub run_mode: RunMode,
}

/// Tunables the engine reads on every task.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub admission: admission::Limits,
    pub limits: preflight::Limits,
    pub retry: RetryPolicy,
    pub split_chunk_size: usize,
    pub upload_chunk_size: usize,
    pub finalize_delay: Duration,
    pub max_finalize_rounds: u32,
    pub auto_advance: bool,
}

impl EngineSettings {
    pub fn from_config(cfg: &DocsplitConfig) -> Self {
        Self {
            admission: cfg.admission_limits(),
            limits: cfg.preflight_limits(),
            retry: cfg.retry_policy(),
            split_chunk_size: cfg.split_chunk_size,
            upload_chunk_size: cfg.upload_chunk_size,
            finalize_delay: cfg.finalize_delay(),
            max_finalize_rounds: cfg.max_finalize_rounds.max(1),
            auto_advance: cfg.auto_advance,
        }
    }

    fn finalize_options(&self) -> FinalizeOptions {
        FinalizeOptions {
            max_rounds: self.max_finalize_rounds,
            auto_advance: self.auto_advance,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&DocsplitConfig::default())
    }
}

pub struct Engine {
    store: StateStore,
    db: JobDb,
    queue: Arc<dyn TaskQueue>,
    worker: Worker,
    extractor: Arc<dyn Extractor>,
    uploader: Arc<dyn Uploader>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        store: StateStore,
        db: JobDb,
        queue: Arc<dyn TaskQueue>,
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
        settings: EngineSettings,
    ) -> Self {
        let worker = Worker::new(
            store.clone(),
            Arc::clone(&extractor),
            Arc::clone(&uploader),
            settings.retry,
        );
        Self {
            store,
            db,
            queue,
            worker,
            extractor,
            uploader,
            settings,
        }
    }

    /// Build an engine on an in-process queue and bind the queue to it.
    pub fn with_local_queue(
        store: StateStore,
        db: JobDb,
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
        settings: EngineSettings,
        worker_slots: usize,
    ) -> (Arc<Engine>, Arc<LocalQueue>) {
        let queue = Arc::new(LocalQueue::new(worker_slots));
        let engine = Arc::new(Engine::new(
            store,
            db,
            Arc::clone(&queue) as Arc<dyn TaskQueue>,
            extractor,
            uploader,
            settings,
        ));
        let runner: Weak<dyn TaskRunner> = Arc::downgrade(&engine) as Weak<dyn TaskRunner>;
        queue.bind(runner);
        (engine, queue)
    }

    /// Open the state directory from `cfg` and wire the bundled collaborators.
    pub async fn open(cfg: &DocsplitConfig) -> Result<(Arc<Engine>, Arc<LocalQueue>)> {
        let state_dir = cfg.resolve_state_dir()?;
        let store = StateStore::open(&state_dir)?;
        let db = JobDb::open_in(&state_dir).await?;
        let uploader: Arc<dyn Uploader> = match &cfg.upload_target {
            None => Arc::new(DirUploader::new(state_dir.join("remote"))),
            Some(UploadTarget::Dir { root }) => Arc::new(DirUploader::new(root.clone())),
            Some(UploadTarget::Webdav {
                base_url,
                username,
                password,
            }) => Arc::new(WebDavUploader::new(
                base_url,
                username.clone(),
                password.clone(),
            )?),
        };
        tracing::debug!(state_dir = %state_dir.display(), uploader = uploader.name(), "engine opened");
        Ok(Self::with_local_queue(
            store,
            db,
            Arc::new(TextPagesExtractor::new()),
            uploader,
            EngineSettings::from_config(cfg),
            cfg.worker_slots,
        ))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn db(&self) -> &JobDb {
        &self.db
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}
