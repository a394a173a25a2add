//! Per-phase manifests and chunk planning.
//!
//! A manifest is the immutable list of work items for one phase of one job.
//! It is written once (`StateStore::put_once`) and reused by every re-run, so
//! item indexes, and the status keys derived from them, never change.

mod build;
mod chunks;

pub use build::{build_split_manifest, build_upload_manifest};
pub use chunks::{plan_chunks, Chunk};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::collab::DestinationRef;
use crate::page_ranges::Segment;
use crate::phase::Phase;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub job_id: String,
    pub phase: Phase,
    pub created_at: i64,
    pub items: Vec<WorkItem>,
    pub meta: ManifestMeta,
}

impl Manifest {
    pub fn len(&self) -> u32 {
        self.items.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item by 1-based index.
    pub fn item(&self, index: u32) -> Option<&WorkItem> {
        let pos = index.checked_sub(1)? as usize;
        self.items.get(pos).filter(|it| it.index == index)
    }
}

/// Phase-level facts the workers need besides the items themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestMeta {
    Split {
        source: PathBuf,
        total_units: u32,
        backend: String,
    },
    Upload {
        destination: DestinationRef,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// 1-based, dense, in manifest order.
    pub index: u32,
    pub label: String,
    pub task: ItemTask,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemTask {
    Extract {
        segments: Vec<Segment>,
        output_name: String,
    },
    Upload {
        artifact_path: PathBuf,
        remote_name: String,
        /// Index of the split item that produced the artifact.
        source_index: u32,
    },
}
