//! Key layout and typed get/put on top of the atomic writers.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::atomic::{write_atomic, write_new, TEMP_PREFIX};
use super::types::{ItemRecord, PhaseState};
use crate::error::OrchestrationError;
use crate::phase::Phase;

const MAX_JOB_ID_LEN: usize = 128;

/// Object addressed within one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKey {
    Request,
    State(Phase),
    Manifest(Phase),
    Item(Phase, u32),
}

/// Reject ids that could escape the job directory.
pub fn validate_job_id(job_id: &str) -> Result<(), OrchestrationError> {
    let ok = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if ok {
        Ok(())
    } else {
        Err(OrchestrationError::InvalidJobId(job_id.to_string()))
    }
}

/// Filesystem-backed key/value store for job state.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("jobs"))
            .with_context(|| format!("create state store at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: &str) -> Result<PathBuf> {
        validate_job_id(job_id)?;
        Ok(self.root.join("jobs").join(job_id))
    }

    fn phase_dir(&self, job_id: &str, phase: Phase) -> Result<PathBuf> {
        Ok(self.job_dir(job_id)?.join(phase.dir_name()))
    }

    /// Canonical path of an object.
    pub fn path(&self, job_id: &str, key: ObjectKey) -> Result<PathBuf> {
        Ok(match key {
            ObjectKey::Request => self.job_dir(job_id)?.join("request.json"),
            ObjectKey::State(p) => self.phase_dir(job_id, p)?.join("state.json"),
            ObjectKey::Manifest(p) => self.phase_dir(job_id, p)?.join("manifest.json"),
            ObjectKey::Item(p, index) => self
                .phase_dir(job_id, p)?
                .join("items")
                .join(format!("{:06}.json", index)),
        })
    }

    /// Directory where a phase's workers place produced artifacts.
    pub fn output_dir(&self, job_id: &str, phase: Phase) -> Result<PathBuf> {
        Ok(self.phase_dir(job_id, phase)?.join("out"))
    }

    pub fn job_exists(&self, job_id: &str) -> Result<bool> {
        Ok(self.job_dir(job_id)?.is_dir())
    }

    /// Serialize `value` and replace the object atomically.
    pub fn put<T: Serialize>(&self, job_id: &str, key: ObjectKey, value: &T) -> Result<()> {
        let path = self.path(job_id, key)?;
        let bytes = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &bytes)
    }

    /// Write only if absent; otherwise return the object already stored.
    pub fn put_once<T>(&self, job_id: &str, key: ObjectKey, value: T) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.path(job_id, key)?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        if write_new(&path, &bytes)? {
            return Ok(value);
        }
        self.get(job_id, key)?
            .with_context(|| format!("{} vanished after write", path.display()))
    }

    /// Read an object. Absent objects are `None`; unparsable ones are
    /// `OrchestrationError::CorruptState`.
    pub fn get<T: DeserializeOwned>(&self, job_id: &str, key: ObjectKey) -> Result<Option<T>> {
        let path = self.path(job_id, key)?;
        read_json(&path)
    }

    pub fn exists(&self, job_id: &str, key: ObjectKey) -> Result<bool> {
        Ok(self.path(job_id, key)?.is_file())
    }

    /// Phase state, or the `PENDING` sentinel if the phase never started.
    pub fn read_state(&self, job_id: &str, phase: Phase) -> Result<PhaseState> {
        Ok(self
            .get(job_id, ObjectKey::State(phase))?
            .unwrap_or_else(|| PhaseState::pending(job_id, phase)))
    }

    pub fn write_state(&self, state: &PhaseState) -> Result<()> {
        self.put(&state.job_id, ObjectKey::State(state.phase), state)
    }

    pub fn item(&self, job_id: &str, phase: Phase, index: u32) -> Result<Option<ItemRecord>> {
        self.get(job_id, ObjectKey::Item(phase, index))
    }

    pub fn write_item(&self, job_id: &str, phase: Phase, record: &ItemRecord) -> Result<()> {
        self.put(job_id, ObjectKey::Item(phase, record.index), record)
    }

    /// All item records present for a phase, ordered by index.
    pub fn list_items(&self, job_id: &str, phase: Phase) -> Result<Vec<ItemRecord>> {
        let dir = self.phase_dir(job_id, phase)?.join("items");
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("list {}", dir.display())),
        };
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name.starts_with(TEMP_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            if let Some(rec) = read_json::<ItemRecord>(&entry.path())? {
                out.push(rec);
            }
        }
        out.sort_by_key(|r| r.index);
        Ok(out)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    serde_json::from_slice(&data).map(Some).map_err(|e| {
        anyhow::Error::from(OrchestrationError::CorruptState {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    })
}
