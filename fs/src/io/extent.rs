//! File-to-device extent mapping.

use alloc::vec::Vec;

use crate::core::error::CacheResult;
use crate::core::types::NodeRef;

/// A run of file bytes stored contiguously on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileExtent {
    /// Byte offset on the device of the first file byte in this run
    pub device_offset: u64,
    /// Length of the run in bytes
    pub len: u64,
}

impl FileExtent {
    /// Create an extent
    pub const fn new(device_offset: u64, len: u64) -> Self {
        Self { device_offset, len }
    }
}

/// Resolves file ranges to device extents.
///
/// Implemented by the filesystem that owns the node.
pub trait ExtentMap: Send + Sync {
    /// Describe where `[offset, offset + len)` of `node` lives on disk.
    ///
    /// The first extent starts at `offset`; following extents continue the
    /// range in file order. At most `max_extents` entries are returned and
    /// they may cover less than `len` bytes. Fails with `NotFound` when the
    /// range cannot be resolved.
    fn resolve(
        &self,
        node: NodeRef,
        offset: u64,
        len: usize,
        max_extents: usize,
    ) -> CacheResult<Vec<FileExtent>>;
}
