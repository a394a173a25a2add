//! Uploader for WebDAV servers (Nextcloud, Apache mod_dav, ...).
//!
//! Folders are created with MKCOL one level at a time, files are stored with
//! PUT. Requests are blocking libcurl transfers.

use curl::easy::{Easy, List, ReadError};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{destination_components, DestinationRef, RemoteFile, Uploader};
use crate::retry::CollabError;

#[derive(Debug, Clone)]
pub struct WebDavUploader {
    base: Url,
    username: Option<String>,
    password: Option<String>,
    connect_timeout: Duration,
    timeout: Duration,
}

impl WebDavUploader {
    /// `base_url` is the collection under which destinations are resolved.
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("WebDAV base URL cannot hold paths: {}", base_url);
        }
        Ok(Self {
            base,
            username,
            password,
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        })
    }

    /// Collection URL for the given components, always with a trailing slash.
    fn collection_url(&self, parts: &[String]) -> Result<Url, CollabError> {
        let mut url = self.base.clone();
        {
            let mut segs = url
                .path_segments_mut()
                .map_err(|_| CollabError::permanent("WebDAV base URL cannot hold paths"))?;
            segs.pop_if_empty();
            segs.extend(parts.iter().map(String::as_str));
            segs.push("");
        }
        Ok(url)
    }

    fn file_url(collection: &str, name: &str) -> Result<Url, CollabError> {
        let mut url = Url::parse(collection)
            .map_err(|e| CollabError::permanent(format!("bad destination URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CollabError::permanent("destination URL cannot hold paths"))?
            .pop_if_empty()
            .push(name);
        Ok(url)
    }

    fn easy(&self, url: &Url, method: &str) -> Result<Easy, CollabError> {
        let ctx = |e: curl::Error| CollabError::curl(method, &e);
        let mut easy = Easy::new();
        easy.url(url.as_str()).map_err(ctx)?;
        easy.custom_request(method).map_err(ctx)?;
        easy.connect_timeout(self.connect_timeout).map_err(ctx)?;
        easy.timeout(self.timeout).map_err(ctx)?;
        if let Some(user) = &self.username {
            easy.username(user).map_err(ctx)?;
        }
        if let Some(pass) = &self.password {
            easy.password(pass).map_err(ctx)?;
        }
        Ok(easy)
    }

    /// Send a body-less request and return the response status.
    fn simple(&self, url: &Url, method: &str, extra_headers: &[&str]) -> Result<u32, CollabError> {
        let ctx = |e: curl::Error| CollabError::curl(method, &e);
        let mut easy = self.easy(url, method)?;
        let mut list = List::new();
        for h in extra_headers {
            list.append(h).map_err(ctx)?;
        }
        easy.http_headers(list).map_err(ctx)?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| Ok(data.len())).map_err(ctx)?;
            transfer.perform().map_err(ctx)?;
        }
        easy.response_code().map_err(ctx)
    }
}

impl Uploader for WebDavUploader {
    fn name(&self) -> &str {
        "webdav"
    }

    fn resolve_destination(
        &self,
        path: &str,
        create_if_missing: bool,
    ) -> Result<DestinationRef, CollabError> {
        let parts = destination_components(path)?;
        let target = self.collection_url(&parts)?;

        if create_if_missing {
            for depth in 1..=parts.len() {
                let url = self.collection_url(&parts[..depth])?;
                match self.simple(&url, "MKCOL", &[])? {
                    // 405: collection already exists.
                    200..=299 | 405 => {}
                    code => return Err(CollabError::http(&format!("MKCOL {}", url), code)),
                }
            }
        } else {
            match self.simple(&target, "PROPFIND", &["Depth: 0"])? {
                200..=299 => {}
                404 => {
                    return Err(CollabError::permanent(format!(
                        "destination folder not found: {}",
                        target
                    )))
                }
                code => return Err(CollabError::http(&format!("PROPFIND {}", target), code)),
            }
        }

        tracing::debug!(destination = %target, "resolved WebDAV destination");
        Ok(DestinationRef {
            id: target.to_string(),
            path: target.to_string(),
        })
    }

    fn upload(
        &self,
        artifact: &Path,
        destination: &DestinationRef,
        name: &str,
    ) -> Result<RemoteFile, CollabError> {
        let url = Self::file_url(&destination.id, name)?;
        let ctx = |e: curl::Error| CollabError::curl("PUT", &e);

        let mut file = File::open(artifact).map_err(|e| CollabError::io("open artifact", &e))?;
        let size = file
            .metadata()
            .map_err(|e| CollabError::io("stat artifact", &e))?
            .len();

        let mut easy = self.easy(&url, "PUT")?;
        easy.upload(true).map_err(ctx)?;
        easy.in_filesize(size).map_err(ctx)?;
        let mut list = List::new();
        // Disable `Expect: 100-continue`; some servers stall on it.
        list.append("Expect:").map_err(ctx)?;
        list.append("Content-Type: application/octet-stream")
            .map_err(ctx)?;
        easy.http_headers(list).map_err(ctx)?;
        {
            let mut transfer = easy.transfer();
            transfer
                .read_function(|buf| file.read(buf).map_err(|_| ReadError::Abort))
                .map_err(ctx)?;
            transfer.write_function(|data| Ok(data.len())).map_err(ctx)?;
            transfer.perform().map_err(ctx)?;
        }

        let code = easy.response_code().map_err(ctx)?;
        if !(200..300).contains(&code) {
            return Err(CollabError::http(&format!("PUT {}", url), code));
        }
        Ok(RemoteFile {
            remote_id: url.to_string(),
            remote_link: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_urls_are_encoded() {
        let up = WebDavUploader::new("http://dav.local/files", None, None).unwrap();
        let url = up
            .collection_url(&["Q1 2024".to_string(), "a#b".to_string()])
            .unwrap();
        assert_eq!(url.as_str(), "http://dav.local/files/Q1%202024/a%23b/");
        let root = up.collection_url(&[]).unwrap();
        assert_eq!(root.as_str(), "http://dav.local/files/");
    }

    #[test]
    fn file_url_appends_name() {
        let url = WebDavUploader::file_url("http://dav.local/files/out/", "1-4, 9.txt").unwrap();
        assert_eq!(url.as_str(), "http://dav.local/files/out/1-4,%209.txt");
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(WebDavUploader::new("mailto:ops@example.com", None, None).is_err());
    }
}
