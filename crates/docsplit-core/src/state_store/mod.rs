//! Durable job state: JSON objects on disk, replaced atomically.
//!
//! Layout under the store root:
//!
//! ```text
//! jobs/<job_id>/request.json
//! jobs/<job_id>/<phase>/state.json
//! jobs/<job_id>/<phase>/manifest.json
//! jobs/<job_id>/<phase>/items/<index:06>.json
//! jobs/<job_id>/split/out/<artifact>
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! over the canonical path, so readers see either the old or the new object.

mod atomic;
mod store;
mod types;

pub use store::{validate_job_id, ObjectKey, StateStore};
pub use types::{Counts, ItemRecord, ItemResult, OutputRef, PhaseState, PreflightSummary};
