use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::page_ranges::RangeGroup;

/// Outcome of a successful preflight. Stored as the preflight manifest and
/// consumed by the split manifest builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub source: PathBuf,
    pub source_bytes: u64,
    pub total_units: u32,
    pub groups: Vec<RangeGroup>,
    pub total_extracted_units: u64,
    /// Extractor name.
    pub backend: String,
    /// Extension of the artifacts the extractor produces.
    pub output_extension: String,
}

impl PreflightReport {
    pub fn outputs(&self) -> usize {
        self.groups.len()
    }
}
