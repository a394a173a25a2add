//! Job-level error taxonomy.
//!
//! Item failures never show up here: they are recorded per item and folded
//! into the phase aggregate. These errors abort a phase (or a request) as a whole.

use crate::admission::AdmissionRejected;
use crate::phase::{Phase, PhaseStatus};
use crate::preflight::ValidationError;

/// Fatal orchestration error. The phase it occurs in is marked FAILED with
/// `code()` as the error code.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),
    #[error("unknown job: {0}")]
    UnknownJob(String),
    #[error("job {0} has no stored request")]
    MissingRequest(String),
    #[error("{phase} manifest missing for job {job_id}")]
    MissingManifest { job_id: String, phase: Phase },
    #[error("cannot start {phase}: {predecessor} is {status}, expected SUCCESS")]
    PredecessorNotSucceeded {
        phase: Phase,
        predecessor: Phase,
        status: PhaseStatus,
    },
    #[error("{phase} is already running for job {job_id}; wait for it to converge or run `resume` after a restart")]
    PhaseRunning { job_id: String, phase: Phase },
    #[error("corrupt state object {path}: {reason}")]
    CorruptState { path: String, reason: String },
    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),
}

impl OrchestrationError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestrationError::InvalidJobId(_) => "invalid_job_id",
            OrchestrationError::UnknownJob(_) => "unknown_job",
            OrchestrationError::MissingRequest(_) => "missing_request",
            OrchestrationError::MissingManifest { .. } => "missing_manifest",
            OrchestrationError::PredecessorNotSucceeded { .. } => "predecessor_not_succeeded",
            OrchestrationError::PhaseRunning { .. } => "phase_running",
            OrchestrationError::CorruptState { .. } => "corrupt_state",
            OrchestrationError::DestinationUnavailable(_) => "destination_unavailable",
        }
    }
}

/// Error returned by the public engine API.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Busy(#[from] AdmissionRejected),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
    #[error(transparent)]
    Other(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        // Typed errors travel through `anyhow` inside the engine; surface them again.
        let e = match e.downcast::<OrchestrationError>() {
            Ok(o) => return EngineError::Orchestration(o),
            Err(e) => e,
        };
        let e = match e.downcast::<AdmissionRejected>() {
            Ok(b) => return EngineError::Busy(b),
            Err(e) => e,
        };
        match e.downcast::<ValidationError>() {
            Ok(v) => EngineError::Validation(v),
            Err(e) => EngineError::Other(e),
        }
    }
}

impl EngineError {
    /// Short machine-readable code for CLI output and stored error codes.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Busy(_) => "busy",
            EngineError::Validation(v) => v.code(),
            EngineError::Orchestration(o) => o.code(),
            EngineError::Other(_) => "internal",
        }
    }
}

/// Error code for an `anyhow` error that may wrap a typed error.
pub fn error_code(e: &anyhow::Error) -> &'static str {
    if let Some(o) = e.downcast_ref::<OrchestrationError>() {
        return o.code();
    }
    if let Some(v) = e.downcast_ref::<ValidationError>() {
        return v.code();
    }
    "internal"
}
