//! External collaborators: the extraction engine and the remote store.
//!
//! Both are synchronous traits; the item worker calls them on blocking threads.
//! Errors are `CollabError`s so the worker can classify and retry them.

mod digest;
mod dir;
mod sanitize;
mod text_pages;
mod webdav;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::page_ranges::Segment;
use crate::retry::CollabError;

pub use digest::sha256_path;
pub use dir::DirUploader;
pub use sanitize::sanitize_filename;
pub use text_pages::TextPagesExtractor;
pub use webdav::WebDavUploader;

/// File produced by one extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Resolved upload destination (folder) on the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRef {
    /// Store-specific identifier of the folder.
    pub id: String,
    /// Human-readable location (path or URL).
    pub path: String,
}

/// File stored remotely by one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub remote_id: String,
    pub remote_link: String,
}

/// Source document engine: counts units and extracts segment lists into new files.
pub trait Extractor: Send + Sync {
    /// Backend name recorded with the job.
    fn name(&self) -> &str;

    /// File extension of produced artifacts, without the dot.
    fn output_extension(&self) -> &str;

    fn count_units(&self, source: &Path) -> Result<u32, CollabError>;

    /// Write the concatenation of `segments` to `output`. Must not leave a
    /// partially written file at `output` on failure.
    fn extract(
        &self,
        source: &Path,
        segments: &[Segment],
        output: &Path,
    ) -> Result<Artifact, CollabError>;
}

/// Remote store: resolves a destination folder and stores files in it.
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;

    fn resolve_destination(
        &self,
        path: &str,
        create_if_missing: bool,
    ) -> Result<DestinationRef, CollabError>;

    fn upload(
        &self,
        artifact: &Path,
        destination: &DestinationRef,
        name: &str,
    ) -> Result<RemoteFile, CollabError>;
}

/// Split a slash-separated destination path into clean components.
/// Rejects `..` so a destination can never escape the store root.
pub(crate) fn destination_components(path: &str) -> Result<Vec<String>, CollabError> {
    let mut out = Vec::new();
    for part in path.split(['/', '\\']) {
        let part = part.trim();
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(CollabError::permanent(format!(
                "destination path may not contain '..': {}",
                path
            )));
        }
        out.push(part.to_string());
    }
    Ok(out)
}
