//! Preflight validation: everything that can be checked before any work is scheduled.
//!
//! Validation failures are input defects. They fail the job immediately and
//! are never retried.

mod report;

pub use report::PreflightReport;

use std::fs;
use std::path::Path;

use crate::collab::Extractor;
use crate::page_ranges::{self, RangeError};

/// Static request limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_source_bytes: u64,
    pub max_source_units: u32,
    pub max_outputs: usize,
    pub max_total_extracted_units: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_source_bytes: 1024 * 1024 * 1024,
            max_source_units: 20_000,
            max_outputs: 2_000,
            max_total_extracted_units: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Source file not found: {0}")]
    SourceMissing(String),
    #[error("Source file is too large ({bytes} bytes). Maximum allowed is {max} bytes.")]
    SourceTooLarge { bytes: u64, max: u64 },
    #[error(transparent)]
    Ranges(#[from] RangeError),
    #[error("Could not read source: {0}")]
    Unreadable(String),
    #[error("Source has too many pages ({units}). Maximum allowed is {max}.")]
    TooManyUnits { units: u32, max: u32 },
    #[error("Too many split outputs requested ({outputs}). Maximum allowed is {max}.")]
    TooManyOutputs { outputs: usize, max: usize },
    #[error("Too many total pages requested across splits. Maximum allowed is {max}.")]
    TooManyExtractedUnits { max: u64 },
    #[error("Segment {segment} exceeds total pages ({total})")]
    SegmentOutOfBounds { segment: String, total: u32 },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::SourceMissing(_) => "source_missing",
            ValidationError::SourceTooLarge { .. } => "source_too_large",
            ValidationError::Ranges(_) => "invalid_ranges",
            ValidationError::Unreadable(_) => "source_unreadable",
            ValidationError::TooManyUnits { .. } => "too_many_pages",
            ValidationError::TooManyOutputs { .. } => "too_many_outputs",
            ValidationError::TooManyExtractedUnits { .. } => "too_many_extracted_pages",
            ValidationError::SegmentOutOfBounds { .. } => "segment_out_of_bounds",
        }
    }
}

/// Validate a request against `limits`, consulting `extractor` for the unit count.
/// Checks run in a fixed order and the first failure wins.
pub fn validate(
    source: &Path,
    ranges: &str,
    limits: &Limits,
    extractor: &dyn Extractor,
) -> Result<PreflightReport, ValidationError> {
    let meta = fs::metadata(source)
        .ok()
        .filter(|m| m.is_file())
        .ok_or_else(|| ValidationError::SourceMissing(source.display().to_string()))?;
    let source_bytes = meta.len();
    if source_bytes > limits.max_source_bytes {
        return Err(ValidationError::SourceTooLarge {
            bytes: source_bytes,
            max: limits.max_source_bytes,
        });
    }

    let groups = page_ranges::parse_groups(ranges)?;

    let total_units = extractor
        .count_units(source)
        .map_err(|e| ValidationError::Unreadable(e.message))?;
    if total_units > limits.max_source_units {
        return Err(ValidationError::TooManyUnits {
            units: total_units,
            max: limits.max_source_units,
        });
    }

    if groups.len() > limits.max_outputs {
        return Err(ValidationError::TooManyOutputs {
            outputs: groups.len(),
            max: limits.max_outputs,
        });
    }

    let mut total_extracted_units = 0u64;
    for group in &groups {
        total_extracted_units += group.unit_count();
        if total_extracted_units > limits.max_total_extracted_units {
            return Err(ValidationError::TooManyExtractedUnits {
                max: limits.max_total_extracted_units,
            });
        }
    }

    for group in &groups {
        if let Some(seg) = group.segments.iter().find(|s| s.end > total_units) {
            return Err(ValidationError::SegmentOutOfBounds {
                segment: format!("{}-{}", seg.start, seg.end),
                total: total_units,
            });
        }
    }

    Ok(PreflightReport {
        source: source.to_path_buf(),
        source_bytes,
        total_units,
        groups,
        total_extracted_units,
        backend: extractor.name().to_string(),
        output_extension: extractor.output_extension().to_string(),
    })
}
