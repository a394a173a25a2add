//! Fan-in: fold item status records into a phase outcome.

mod finalize;

pub use finalize::{finalize, live_state, FinalizeOptions, FinalizeOutcome};

use serde::Serialize;

use crate::phase::PhaseStatus;
use crate::state_store::{Counts, ItemRecord, ItemResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub counts: Counts,
    pub status: PhaseStatus,
    pub progress: u8,
}

/// Aggregate `records` for a manifest of `total` items.
///
/// Records with an index outside `1..=total` are ignored. The phase stays
/// RUNNING until every item has a terminal record; an empty manifest is FAILED.
pub fn compute(total: u32, records: &[ItemRecord]) -> Aggregate {
    let mut counts = Counts {
        total,
        done: 0,
        failed: 0,
    };
    for rec in records.iter().filter(|r| r.index >= 1 && r.index <= total) {
        match rec.result {
            ItemResult::Success => counts.done += 1,
            ItemResult::Failed => counts.failed += 1,
        }
    }

    let status = if counts.finished() < total {
        PhaseStatus::Running
    } else if total == 0 {
        PhaseStatus::Failed
    } else if counts.failed == 0 {
        PhaseStatus::Success
    } else if counts.done > 0 {
        PhaseStatus::PartialSuccess
    } else {
        PhaseStatus::Failed
    };

    Aggregate {
        counts,
        status,
        progress: counts.progress(),
    }
}
