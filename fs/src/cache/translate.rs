//! Extent translation: file byte ranges to device transfers.

use alloc::vec::Vec;

use super::FileCache;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::IoDirection;
use crate::io::iovec::{total_len, IoVec, IoVecCursor};

impl FileCache {
    /// Move `len` bytes between `vecs` and the file starting at `offset`.
    ///
    /// Returns the bytes moved, which may be short when the extents or the
    /// device data run out. Never touches the page index.
    pub(crate) fn transfer(
        &self,
        offset: u64,
        vecs: &[IoVec],
        len: usize,
        direction: IoDirection,
    ) -> CacheResult<usize> {
        if len == 0 {
            return Ok(0);
        }

        let max_extents = self.config.max_file_extents;
        let mut extents = self
            .extent_map
            .resolve(self.node, offset, len, max_extents)
            .map_err(|err| self.count_error(err))?;
        extents.truncate(max_extents);

        let first = extents.first().copied().ok_or_else(|| self.count_error(CacheError::NotFound))?;

        // Contiguous on disk: one call for the whole vector list
        if first.len >= len as u64 && total_len(vecs) == len {
            let moved = self
                .device
                .transfer(first.device_offset, vecs, direction)
                .map_err(|err| self.count_error(err))?;
            return Ok(moved.min(len));
        }

        let mut cursor = IoVecCursor::new(vecs);
        let mut slice = Vec::new();
        let mut done = 0usize;

        for extent in &extents {
            if done >= len {
                break;
            }

            let want = extent.len.min((len - done) as u64) as usize;
            slice.clear();
            let collected = cursor.take(want, &mut slice);
            if collected == 0 {
                break;
            }

            let moved = self
                .device
                .transfer(extent.device_offset, &slice, direction)
                .map_err(|err| self.count_error(err))?;
            done += moved.min(collected);

            if moved < collected {
                break;
            }
        }

        log::trace!(
            "filecache {}: {:?} {:#x}+{:#x} over {} extents -> {:#x}",
            self.node,
            direction,
            offset,
            len,
            extents.len(),
            done
        );
        Ok(done)
    }

    fn count_error(&self, err: CacheError) -> CacheError {
        if err.is_device_error() {
            self.stats.io_errors.increment();
        }
        err
    }
}
