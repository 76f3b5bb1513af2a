//! Chunk planning.
//!
//! Every strategy bounds the size of a single statement (or staging write) by splitting the
//! dataset's rows into contiguous chunks. [`plan_chunks`] is the one place chunk boundaries are
//! computed: the ranges are half-open, ascending, and cover `0..row_count` exactly once.

use std::ops::Range;

use crate::error::{UploadError, UploadResult};

/// Partition `0..row_count` into ranges of `chunk_size` rows (the last one may be shorter).
///
/// `row_count == 0` yields no ranges. `chunk_size == 0` is rejected.
pub fn plan_chunks(row_count: usize, chunk_size: usize) -> UploadResult<Vec<Range<usize>>> {
    Ok(ChunkPlan::new(row_count, chunk_size)?.collect())
}

/// Number of chunks [`plan_chunks`] produces: `ceil(row_count / chunk_size)`.
pub fn chunk_count(row_count: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    row_count.div_ceil(chunk_size)
}

/// Lazy form of [`plan_chunks`].
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next_start: usize,
    row_count: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plan chunks over `row_count` rows.
    pub fn new(row_count: usize, chunk_size: usize) -> UploadResult<Self> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidOptions {
                message: "chunk_size must be > 0".to_string(),
            });
        }
        Ok(Self {
            next_start: 0,
            row_count,
            chunk_size,
        })
    }
}

impl Iterator for ChunkPlan {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.row_count {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.chunk_size).min(self.row_count);
        self.next_start = end;
        Some(start..end)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = chunk_count(self.row_count.saturating_sub(self.next_start), self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}
