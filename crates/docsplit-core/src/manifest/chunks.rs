//! Contiguous chunking of manifest indexes for fan-out.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Contiguous run of item indexes handled by one chunk task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based chunk number.
    pub number: u32,
    pub first: u32,
    pub last: u32,
}

impl Chunk {
    pub fn indexes(&self) -> RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// Split indexes `1..=total` into ⌈total / chunk_size⌉ contiguous chunks.
/// A chunk size of 0 is treated as 1.
pub fn plan_chunks(total: u32, chunk_size: usize) -> Vec<Chunk> {
    let size = u32::try_from(chunk_size.max(1)).unwrap_or(u32::MAX);
    let mut out = Vec::with_capacity(total.div_ceil(size) as usize);
    let mut first = 1u32;
    while first <= total {
        let last = first.saturating_add(size - 1).min(total);
        out.push(Chunk {
            number: out.len() as u32 + 1,
            first,
            last,
        });
        if last == total {
            break;
        }
        first = last + 1;
    }
    out
}
