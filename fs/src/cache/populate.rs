//! Read fill: bring absent pages in from the device.

use super::reserve::ReservedRun;
use super::FileCache;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{page_align_down, page_offset_of, pages_spanned, IoDirection, PAGE_SIZE};
use crate::vm::{IndexGuard, PageState};

impl FileCache {
    /// Populate the pages covering `[offset, offset + size)`, all of which
    /// must be absent, and copy the requested bytes into `buffer`.
    ///
    /// Takes the locked index and hands it back relocked. Returns the
    /// number of requested bytes that were backed by device data. On error
    /// the pages inserted by this call are gone again.
    pub(crate) fn populate<'c>(
        &'c self,
        mut index: IndexGuard<'c>,
        offset: u64,
        size: usize,
        buffer: Option<&mut [u8]>,
    ) -> CacheResult<(IndexGuard<'c>, usize)> {
        let base = page_align_down(offset);
        let in_page = page_offset_of(offset);
        let count = pages_spanned(in_page, size);
        crate::cache_ensure!(
            count <= self.config.max_chunk_pages,
            CacheError::ResourceExhausted
        );
        if count == 0 {
            return Ok((index, 0));
        }

        let mut run = ReservedRun::reserve(&self.vm, &mut index, base, count)?;
        drop(index);

        let span = count * PAGE_SIZE;
        let transferred = match self.transfer(base, run.vecs(), span, IoDirection::Read) {
            Ok(n) => n.min(span),
            Err(err) => {
                let mut index = self.vm.lock();
                run.rollback(&mut index);
                log::warn!(
                    "filecache {}: read fill {:#x}+{:#x} failed: {}",
                    self.node,
                    base,
                    span,
                    err
                );
                return Err(err);
            },
        };

        run.zero_from(transferred);
        let backed = transferred.saturating_sub(in_page).min(size);
        if let Some(buffer) = buffer {
            run.copy_out(in_page, &mut buffer[..backed]);
        }

        let mut index = self.vm.lock();
        run.finish(&mut index, pages_spanned(0, transferred), PageState::Active);
        Ok((index, backed))
    }
}
