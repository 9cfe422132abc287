//! Scatter/gather vector lists.
//!
//! A populate or flush call maps each reserved page at its own temporary
//! address and describes the run to the device as a list of `IoVec`s.
//! Pages whose mappings happen to be adjacent collapse into one entry.

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use static_assertions::const_assert;

use crate::core::config::MAX_READ_PAGES;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::VirtAddr;

/// Capacity of a request-scoped vector list
pub const MAX_IO_VECS: usize = 32;

const_assert!(MAX_IO_VECS >= MAX_READ_PAGES);

// ============================================================================
// IoVec
// ============================================================================

/// One contiguous memory span of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVec {
    /// Start address
    pub base: VirtAddr,
    /// Length in bytes
    pub len: usize,
}

impl IoVec {
    /// Create a vector entry
    pub const fn new(base: VirtAddr, len: usize) -> Self {
        Self { base, len }
    }

    /// Describe a byte slice as a transfer source
    pub fn from_slice(buf: &[u8]) -> Self {
        Self::new(VirtAddr::from_ptr(buf.as_ptr()), buf.len())
    }

    /// Describe a byte slice as a transfer destination
    pub fn from_mut_slice(buf: &mut [u8]) -> Self {
        Self::new(VirtAddr::from_ptr(buf.as_mut_ptr()), buf.len())
    }

    /// Address one past the last byte
    #[inline]
    pub const fn end(&self) -> VirtAddr {
        self.base.add(self.len)
    }
}

/// Sum of the lengths of `vecs`
pub fn total_len(vecs: &[IoVec]) -> usize {
    vecs.iter().map(|v| v.len).sum()
}

// ============================================================================
// IoVecList
// ============================================================================

/// Fixed-capacity vector list.
#[derive(Debug, Clone, Default)]
pub struct IoVecList<const N: usize = MAX_IO_VECS> {
    vecs: ArrayVec<IoVec, N>,
}

impl<const N: usize> IoVecList<N> {
    /// Create an empty list
    pub const fn new() -> Self {
        Self {
            vecs: ArrayVec::new_const(),
        }
    }

    /// Append a span, merging it into the last entry when it starts where
    /// that entry ends.
    ///
    /// Zero-length spans are ignored. A full list rejects a span that
    /// cannot be merged with [`CacheError::Overflow`] and is left as it was.
    pub fn add_span(&mut self, base: VirtAddr, len: usize) -> CacheResult<()> {
        if len == 0 {
            return Ok(());
        }

        if let Some(last) = self.vecs.last_mut() {
            if last.end() == base {
                last.len += len;
                return Ok(());
            }
        }

        self.vecs
            .try_push(IoVec::new(base, len))
            .map_err(|_| CacheError::Overflow)
    }

    /// Entries
    pub fn as_slice(&self) -> &[IoVec] {
        &self.vecs
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.vecs.len()
    }

    /// Is the list empty?
    pub fn is_empty(&self) -> bool {
        self.vecs.is_empty()
    }

    /// Total bytes described
    pub fn total_len(&self) -> usize {
        total_len(&self.vecs)
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Sequential reader over a vector slice.
///
/// Used to hand each device call exactly the memory that belongs to one
/// extent when a transfer spans several.
#[derive(Debug)]
pub struct IoVecCursor<'v> {
    vecs: &'v [IoVec],
    index: usize,
    offset: usize,
}

impl<'v> IoVecCursor<'v> {
    /// Start at the first byte of `vecs`
    pub fn new(vecs: &'v [IoVec]) -> Self {
        Self {
            vecs,
            index: 0,
            offset: 0,
        }
    }

    /// Append entries covering the next `len` bytes to `out`, splitting an
    /// entry where needed. Returns the bytes collected, which is less than
    /// `len` only when the vectors run out.
    pub fn take(&mut self, len: usize, out: &mut Vec<IoVec>) -> usize {
        let mut collected = 0;

        while collected < len && self.index < self.vecs.len() {
            let vec = self.vecs[self.index];
            let available = vec.len - self.offset;
            let chunk = available.min(len - collected);

            if chunk > 0 {
                out.push(IoVec::new(vec.base.add(self.offset), chunk));
                collected += chunk;
            }

            self.offset += chunk;
            if self.offset == vec.len {
                self.index += 1;
                self.offset = 0;
            }
        }

        collected
    }

    /// Has every byte been consumed?
    pub fn is_exhausted(&self) -> bool {
        self.index >= self.vecs.len()
    }
}
