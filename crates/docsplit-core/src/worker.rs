//! Item worker: executes the items of one chunk and records their outcome.
//!
//! Items that already have a SUCCESS record are skipped, which is what makes
//! re-running a phase only touch missing and failed items.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collab::{DestinationRef, Extractor, Uploader};
use crate::error::OrchestrationError;
use crate::manifest::{Chunk, ItemTask, Manifest, ManifestMeta, WorkItem};
use crate::page_ranges::Segment;
use crate::phase::Phase;
use crate::retry::{run_with_retry, CollabError, RetryPolicy};
use crate::state_store::{ItemRecord, ObjectKey, OutputRef, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRun {
    Skipped,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkSummary {
    pub skipped: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Fully-resolved work for one item, ready to move onto a blocking thread.
enum Job {
    Extract {
        source: PathBuf,
        segments: Vec<Segment>,
        output: PathBuf,
    },
    Upload {
        artifact: PathBuf,
        destination: DestinationRef,
        name: String,
    },
}

#[derive(Clone)]
pub struct Worker {
    store: StateStore,
    extractor: Arc<dyn Extractor>,
    uploader: Arc<dyn Uploader>,
    policy: RetryPolicy,
}

impl Worker {
    pub fn new(
        store: StateStore,
        extractor: Arc<dyn Extractor>,
        uploader: Arc<dyn Uploader>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            extractor,
            uploader,
            policy,
        }
    }

    /// Run every item of `chunk` in index order.
    ///
    /// An item whose record cannot be stored does not stop its siblings; the
    /// first such error is returned once the chunk is done.
    pub async fn run_chunk(&self, job_id: &str, phase: Phase, chunk: Chunk) -> Result<ChunkSummary> {
        let manifest: Manifest = self
            .store
            .get(job_id, ObjectKey::Manifest(phase))?
            .ok_or_else(|| OrchestrationError::MissingManifest {
                job_id: job_id.to_string(),
                phase,
            })?;

        let mut summary = ChunkSummary::default();
        let mut first_err = None;
        for index in chunk.indexes() {
            let Some(item) = manifest.item(index) else {
                tracing::warn!(job_id, phase = %phase, index, "chunk index not in manifest");
                continue;
            };
            match self.run_item(job_id, &manifest, item).await {
                Ok(ItemRun::Skipped) => summary.skipped += 1,
                Ok(ItemRun::Succeeded) => summary.succeeded += 1,
                Ok(ItemRun::Failed) => summary.failed += 1,
                Err(e) => {
                    tracing::error!(job_id, phase = %phase, index, "item record not stored: {:#}", e);
                    first_err.get_or_insert(e);
                }
            }
        }
        tracing::info!(
            job_id,
            phase = %phase,
            chunk = chunk.number,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "chunk finished"
        );
        match first_err {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Execute one item unless it already succeeded, and write its terminal record.
    pub async fn run_item(&self, job_id: &str, manifest: &Manifest, item: &WorkItem) -> Result<ItemRun> {
        let phase = manifest.phase;
        if let Some(rec) = self.store.item(job_id, phase, item.index)? {
            if rec.is_success() {
                tracing::debug!(job_id, phase = %phase, index = item.index, "already done, skipping");
                return Ok(ItemRun::Skipped);
            }
        }

        let record = match self.resolve(job_id, manifest, item) {
            Ok(job) => self.execute(job_id, phase, item.index, job).await,
            // Unrunnable item: counts as one attempt that failed up front.
            Err(e) => ItemRecord::failed(item.index, 1, e.message),
        };
        self.store.write_item(job_id, phase, &record)?;

        if record.is_success() {
            tracing::debug!(job_id, phase = %phase, index = item.index, attempts = record.attempts, "item succeeded");
            Ok(ItemRun::Succeeded)
        } else {
            tracing::warn!(
                job_id,
                phase = %phase,
                index = item.index,
                attempts = record.attempts,
                "item failed: {}",
                record.error.as_deref().unwrap_or("")
            );
            Ok(ItemRun::Failed)
        }
    }

    fn resolve(&self, job_id: &str, manifest: &Manifest, item: &WorkItem) -> Result<Job, CollabError> {
        match (&item.task, &manifest.meta) {
            (
                ItemTask::Extract {
                    segments,
                    output_name,
                },
                ManifestMeta::Split { source, .. },
            ) => {
                let dir = self
                    .store
                    .output_dir(job_id, Phase::Split)
                    .map_err(|e| CollabError::permanent(e.to_string()))?;
                Ok(Job::Extract {
                    source: source.clone(),
                    segments: segments.clone(),
                    output: dir.join(output_name),
                })
            }
            (
                ItemTask::Upload {
                    artifact_path,
                    remote_name,
                    ..
                },
                ManifestMeta::Upload { destination },
            ) => Ok(Job::Upload {
                artifact: artifact_path.clone(),
                destination: destination.clone(),
                name: remote_name.clone(),
            }),
            _ => Err(CollabError::permanent(
                "work item does not match the manifest kind",
            )),
        }
    }

    async fn execute(&self, job_id: &str, phase: Phase, index: u32, job: Job) -> ItemRecord {
        let job = Arc::new(job);
        let outcome = run_with_retry(&self.policy, |attempt| {
            let job = Arc::clone(&job);
            let extractor = Arc::clone(&self.extractor);
            let uploader = Arc::clone(&self.uploader);
            tracing::debug!(job_id, phase = %phase, index, attempt, "executing item");
            async move {
                let joined = tokio::task::spawn_blocking(move || match job.as_ref() {
                    Job::Extract {
                        source,
                        segments,
                        output,
                    } => extractor
                        .extract(source, segments, output)
                        .map(|a| OutputRef::Artifact {
                            path: a.path,
                            bytes: a.bytes,
                            sha256: a.sha256,
                        }),
                    Job::Upload {
                        artifact,
                        destination,
                        name,
                    } => uploader
                        .upload(artifact, destination, name)
                        .map(|r| OutputRef::Remote {
                            remote_id: r.remote_id,
                            remote_link: r.remote_link,
                        }),
                })
                .await;
                match joined {
                    Ok(result) => result,
                    Err(e) => Err(CollabError::permanent(format!("worker thread failed: {}", e))),
                }
            }
        })
        .await;

        match outcome.result {
            Ok(output) => ItemRecord::success(index, outcome.attempts, output),
            Err(e) => ItemRecord::failed(index, outcome.attempts, e.message),
        }
    }
}
