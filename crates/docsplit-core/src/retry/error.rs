//! Error returned by collaborators (extraction, upload) for retry classification.

use std::io;

use super::classify::{classify_curl_error, classify_http_status, classify_io_error};
use super::policy::ErrorKind;

/// Error from one collaborator call. The `kind` drives the retry decision;
/// the message is what ends up in the item status record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CollabError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CollabError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Error that is never retried.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn io(context: &str, e: &io::Error) -> Self {
        Self::new(classify_io_error(e), format!("{}: {}", context, e))
    }

    pub fn curl(context: &str, e: &curl::Error) -> Self {
        Self::new(classify_curl_error(e), format!("{}: {}", context, e))
    }

    pub fn http(context: &str, code: u32) -> Self {
        Self::new(classify_http_status(code), format!("{}: HTTP {}", context, code))
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
