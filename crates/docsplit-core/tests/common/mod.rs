//! Shared helpers for integration tests.
#![allow(dead_code)]

pub mod dav_server;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use docsplit_core::collab::{Artifact, Extractor, TextPagesExtractor, Uploader};
use docsplit_core::engine::{Engine, EngineSettings, SubmitRequest};
use docsplit_core::job_db::{JobDb, RunMode};
use docsplit_core::page_ranges::Segment;
use docsplit_core::queue::LocalQueue;
use docsplit_core::retry::{CollabError, RetryPolicy};
use docsplit_core::state_store::StateStore;

/// Write a form-feed paginated text source with `pages` pages.
pub fn write_pages(dir: &Path, pages: usize) -> PathBuf {
    let path = dir.join("source.txt");
    let body = (1..=pages)
        .map(|i| format!("page {}", i))
        .collect::<Vec<_>>()
        .join("\x0c");
    fs::write(&path, body).unwrap();
    path
}

pub fn request(source: &Path, ranges: &str, run_mode: RunMode) -> SubmitRequest {
    SubmitRequest {
        source: source.to_path_buf(),
        page_ranges: ranges.to_string(),
        destination: "exports/run".to_string(),
        run_mode,
    }
}

/// Fast settings: no backoff, short finalizer delay.
pub fn fast_settings(chunk_size: usize, auto_advance: bool) -> EngineSettings {
    EngineSettings {
        retry: RetryPolicy::immediate(3),
        split_chunk_size: chunk_size,
        upload_chunk_size: chunk_size,
        finalize_delay: Duration::from_millis(5),
        auto_advance,
        ..EngineSettings::default()
    }
}

pub async fn open_engine(
    state_dir: &Path,
    extractor: Arc<dyn Extractor>,
    uploader: Arc<dyn Uploader>,
    settings: EngineSettings,
) -> (Arc<Engine>, Arc<LocalQueue>) {
    let store = StateStore::open(state_dir).unwrap();
    let db = JobDb::open_in(state_dir).await.unwrap();
    Engine::with_local_queue(store, db, extractor, uploader, settings, 8)
}

/// Blocks callers of `pass` while closed.
pub struct Gate {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
            cvar: Condvar::new(),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cvar.notify_all();
    }

    fn pass(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cvar.wait(open).unwrap();
        }
    }
}

/// Text extractor that counts calls, can fail chosen outputs permanently,
/// and can hold `count_units` or `extract` until released.
pub struct ScriptedExtractor {
    inner: TextPagesExtractor,
    pub extract_calls: AtomicU32,
    failing: Mutex<HashSet<String>>,
    pub fail_enabled: AtomicBool,
    pub count_gate: Gate,
    pub extract_gate: Gate,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self {
            inner: TextPagesExtractor::new(),
            extract_calls: AtomicU32::new(0),
            failing: Mutex::new(HashSet::new()),
            fail_enabled: AtomicBool::new(true),
            count_gate: Gate::new(),
            extract_gate: Gate::new(),
        }
    }

    /// Fail every extraction whose output file name is in `names`.
    pub fn failing(self, names: &[&str]) -> Self {
        *self.failing.lock().unwrap() = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> u32 {
        self.extract_calls.load(Ordering::SeqCst)
    }
}

impl Extractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn output_extension(&self) -> &str {
        self.inner.output_extension()
    }

    fn count_units(&self, source: &Path) -> Result<u32, CollabError> {
        self.count_gate.pass();
        self.inner.count_units(source)
    }

    fn extract(
        &self,
        source: &Path,
        segments: &[Segment],
        output: &Path,
    ) -> Result<Artifact, CollabError> {
        self.extract_gate.pass();
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_enabled.load(Ordering::SeqCst) && self.failing.lock().unwrap().contains(&name)
        {
            return Err(CollabError::permanent(format!("cannot render {}", name)));
        }
        self.inner.extract(source, segments, output)
    }
}
