//! Uploader that stores artifacts in a local directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use super::{destination_components, DestinationRef, RemoteFile, Uploader};
use crate::retry::CollabError;

#[derive(Debug, Clone)]
pub struct DirUploader {
    root: PathBuf,
}

impl DirUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn link_for(path: &Path) -> String {
    fs::canonicalize(path)
        .ok()
        .and_then(|abs| url::Url::from_file_path(abs).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl Uploader for DirUploader {
    fn name(&self) -> &str {
        "dir"
    }

    fn resolve_destination(
        &self,
        path: &str,
        create_if_missing: bool,
    ) -> Result<DestinationRef, CollabError> {
        let parts = destination_components(path)?;
        let dir = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));
        if !dir.is_dir() {
            if !create_if_missing {
                return Err(CollabError::permanent(format!(
                    "destination folder not found: {}",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir).map_err(|e| CollabError::io("create destination", &e))?;
        }
        Ok(DestinationRef {
            id: parts.join("/"),
            path: dir.display().to_string(),
        })
    }

    fn upload(
        &self,
        artifact: &Path,
        destination: &DestinationRef,
        name: &str,
    ) -> Result<RemoteFile, CollabError> {
        let dir = PathBuf::from(&destination.path);
        let target = dir.join(name);
        let mut tmp = target.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = fs::copy(artifact, &tmp).and_then(|_| fs::rename(&tmp, &target)) {
            let _ = fs::remove_file(&tmp);
            return Err(CollabError::io("store artifact", &e));
        }

        let remote_id = if destination.id.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", destination.id, name)
        };
        Ok(RemoteFile {
            remote_id,
            remote_link: link_for(&target),
        })
    }
}
