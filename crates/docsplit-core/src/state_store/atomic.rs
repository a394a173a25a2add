//! Temp-file-and-rename writes.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Prefix of in-flight temp files. Readers never open these.
pub(crate) const TEMP_PREFIX: &str = ".tmp-";

fn temp_in(path: &Path, bytes: &[u8]) -> Result<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory: {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .with_context(|| format!("temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Replace `path` with `bytes` atomically.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = temp_in(path, bytes)?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("rename onto {}", path.display()))?;
    Ok(())
}

/// Create `path` with `bytes` only if nothing exists there yet.
/// Returns `false` (and leaves the existing file alone) if it already exists.
pub(crate) fn write_new(path: &Path, bytes: &[u8]) -> Result<bool> {
    let tmp = temp_in(path, bytes)?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error).with_context(|| format!("link onto {}", path.display())),
    }
}
