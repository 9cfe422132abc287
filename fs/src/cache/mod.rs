//! # File Cache
//!
//! Per-file cache handle and the engines behind it.
//!
//! ## Request Flow
//!
//! ```text
//! read / write
//!   └─ cache_io (dispatch)
//!        ├─ hit  → copy between page and caller buffer
//!        └─ gap  → populate (read) / flush_fill (write)
//!                    └─ reserve → transfer (extent translation) → device
//! ```
//!
//! Gaps are serviced in chunks of at most `max_chunk_pages` pages. The
//! cache lock is dropped for every device call; pages under I/O are
//! `Busy` until the call that reserved them finishes or rolls back.

mod dispatch;
mod flush;
mod populate;
mod prefetch;
mod reserve;
mod stats;
mod translate;
mod writeback;

use alloc::sync::Arc;
use core::fmt;

pub use stats::{CacheStats, CacheStatsSnapshot};

use crate::accounting::{CacheAccounting, NodeInfo};
use crate::core::config::FileCacheConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{IoDirection, NodeRef};
use crate::io::device::DeviceHandle;
use crate::io::extent::ExtentMap;
use crate::io::iovec::{total_len, IoVec};
use crate::vm::VmCache;
use dispatch::IoBuffer;

// =============================================================================
// FILE CACHE
// =============================================================================

/// Cache handle of one open file
pub struct FileCache {
    node: NodeRef,
    vm: Arc<VmCache>,
    device: DeviceHandle,
    extent_map: Arc<dyn ExtentMap>,
    accounting: Arc<dyn CacheAccounting>,
    config: FileCacheConfig,
    stats: CacheStats,
}

impl FileCache {
    pub(crate) fn new(
        node: NodeRef,
        vm: Arc<VmCache>,
        device: DeviceHandle,
        extent_map: Arc<dyn ExtentMap>,
        accounting: Arc<dyn CacheAccounting>,
        config: FileCacheConfig,
    ) -> Self {
        Self {
            node,
            vm,
            device,
            extent_map,
            accounting,
            config,
            stats: CacheStats::new(),
        }
    }

    /// Node this cache belongs to
    pub fn node(&self) -> NodeRef {
        self.node
    }

    /// Underlying VM cache
    pub fn vm_cache(&self) -> &Arc<VmCache> {
        &self.vm
    }

    /// Active configuration
    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    /// Logical file size
    pub fn size(&self) -> u64 {
        self.vm.virtual_size()
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Change the logical file size.
    ///
    /// Shrinking drops resident pages past the new end and zeroes the
    /// remainder of the last partial page.
    pub fn set_size(&self, new_size: u64) -> CacheResult<()> {
        let dropped = self.vm.resize(new_size)?;
        log::debug!(
            "filecache {}: size -> {:#x}, {} pages dropped",
            self.node,
            new_size,
            dropped
        );
        Ok(())
    }

    /// Read through the cache. Returns the bytes read, which is short only
    /// at end of file or end of device data.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> CacheResult<usize> {
        let n = self.cache_io(offset, IoBuffer::Read(buf))?;
        self.stats.bytes_read.add(n as u64);
        Ok(n)
    }

    /// Write through the cache. Bytes past the logical size are dropped;
    /// call `set_size` first to extend the file.
    pub fn write(&self, offset: u64, buf: &[u8]) -> CacheResult<usize> {
        let n = self.cache_io(offset, IoBuffer::Write(buf))?;
        self.stats.bytes_written.add(n as u64);

        if self.config.write_through && n > 0 {
            self.write_back(offset, offset + n as u64)?;
        }
        Ok(n)
    }

    /// Read straight from the device into caller-managed pages, bypassing
    /// the cache.
    ///
    /// # Safety
    ///
    /// Every entry of `vecs` must describe memory valid for writes for the
    /// duration of the call and not referenced by anything else.
    pub unsafe fn read_pages(&self, offset: u64, vecs: &[IoVec], size: usize) -> CacheResult<usize> {
        crate::cache_ensure!(size <= total_len(vecs), CacheError::InvalidArgument);
        self.transfer(offset, vecs, size, IoDirection::Read)
    }

    /// Write caller-managed pages straight to the device, bypassing the
    /// cache.
    ///
    /// # Safety
    ///
    /// Every entry of `vecs` must describe memory valid for reads for the
    /// duration of the call.
    pub unsafe fn write_pages(&self, offset: u64, vecs: &[IoVec], size: usize) -> CacheResult<usize> {
        crate::cache_ensure!(size <= total_len(vecs), CacheError::InvalidArgument);
        self.transfer(offset, vecs, size, IoDirection::Write)
    }

    /// Tell the accounting collaborator the node was opened
    pub fn node_opened(&self) {
        self.accounting.node_opened(&self.node_info());
    }

    /// Tell the accounting collaborator the node was closed
    pub fn node_closed(&self) {
        let stats = self.stats.snapshot();
        log::debug!(
            "filecache {}: closed, {}% hits, {} busy waits, {} I/O errors",
            self.node,
            stats.hit_ratio_percent(),
            stats.busy_waits,
            stats.io_errors
        );
        self.accounting.node_closed(&self.node_info(), &stats);
    }

    fn node_info(&self) -> NodeInfo {
        let index = self.vm.lock();
        NodeInfo {
            node: self.node,
            size: index.virtual_size(),
            resident_pages: index.len(),
        }
    }
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("node", &self.node)
            .field("vm", &self.vm)
            .field("device", &self.device)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
