//! Extractor for paginated plain text: pages are separated by form feeds (`\x0c`).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use super::{digest::sha256_path, Artifact, Extractor};
use crate::page_ranges::Segment;
use crate::retry::CollabError;

const PAGE_BREAK: char = '\x0c';

/// Pages of the last source read, valid while its size and mtime are unchanged.
#[derive(Debug)]
struct CachedSource {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
    pages: Arc<Vec<String>>,
}

/// Every item of a split reads from the same source, so the parsed pages of
/// the most recent source are kept and shared between extractions.
#[derive(Debug, Default)]
pub struct TextPagesExtractor {
    last: Mutex<Option<CachedSource>>,
}

impl TextPagesExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn pages(&self, source: &Path) -> Result<Arc<Vec<String>>, CollabError> {
        let meta = fs::metadata(source).map_err(|e| CollabError::io("stat source", &e))?;
        let modified = meta.modified().ok();
        // Held while reading, so concurrent chunks wait for one parse.
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(c) = last.as_ref() {
            if c.path == source && c.len == meta.len() && c.modified == modified {
                return Ok(Arc::clone(&c.pages));
            }
        }
        let pages = Arc::new(read_pages(source)?);
        *last = Some(CachedSource {
            path: source.to_path_buf(),
            len: meta.len(),
            modified,
            pages: Arc::clone(&pages),
        });
        Ok(pages)
    }
}

fn read_pages(source: &Path) -> Result<Vec<String>, CollabError> {
    let bytes = fs::read(source).map_err(|e| CollabError::io("read source", &e))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CollabError::permanent(format!("{} is not UTF-8 text", source.display())))?;
    Ok(split_pages(&text))
}

/// Split text into pages. A trailing form feed does not start an extra page,
/// and an empty document has no pages.
fn split_pages(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }
    pages
}

fn part_path(output: &Path) -> PathBuf {
    let mut o = output.as_os_str().to_owned();
    o.push(".part");
    PathBuf::from(o)
}

impl Extractor for TextPagesExtractor {
    fn name(&self) -> &str {
        "text-pages"
    }

    fn output_extension(&self) -> &str {
        "txt"
    }

    fn count_units(&self, source: &Path) -> Result<u32, CollabError> {
        let pages = self.pages(source)?;
        u32::try_from(pages.len())
            .map_err(|_| CollabError::permanent("page count does not fit in u32"))
    }

    fn extract(
        &self,
        source: &Path,
        segments: &[Segment],
        output: &Path,
    ) -> Result<Artifact, CollabError> {
        let pages = self.pages(source)?;
        let mut selected: Vec<&str> = Vec::new();
        for seg in segments {
            if seg.start == 0 || seg.end as usize > pages.len() {
                return Err(CollabError::permanent(format!(
                    "segment {} is outside the document ({} pages)",
                    seg.label(),
                    pages.len()
                )));
            }
            for page in &pages[(seg.start - 1) as usize..seg.end as usize] {
                selected.push(page);
            }
        }
        let body = selected.join(&PAGE_BREAK.to_string());

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| CollabError::io("create output dir", &e))?;
        }
        let tmp = part_path(output);
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(body.as_bytes())?;
            f.sync_all()?;
            fs::rename(&tmp, output)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(CollabError::io("write artifact", &e));
        }

        let sha256 = sha256_path(output).map_err(|e| CollabError::io("hash artifact", &e))?;
        Ok(Artifact {
            path: output.to_path_buf(),
            bytes: body.len() as u64,
            sha256,
        })
    }
}
