//! Write fill: prepare absent pages for a write.
//!
//! Parts of a page the caller does not overwrite are read from the device
//! first so the write never clobbers neighbouring bytes.

use super::reserve::ReservedRun;
use super::FileCache;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{
    page_align_down, page_offset_of, pages_spanned, IoDirection, PAGE_SIZE, PAGE_SIZE_U64,
};
use crate::vm::{IndexGuard, PageState};

impl FileCache {
    /// Fill the absent pages covering `[offset, offset + size)` with the
    /// bytes of `buffer`, read-filling whatever the buffer does not cover.
    ///
    /// Without a buffer the whole run is read-filled and left `Active`.
    /// Returns the relocked index and the bytes accepted.
    pub(crate) fn flush_fill<'c>(
        &'c self,
        mut index: IndexGuard<'c>,
        offset: u64,
        size: usize,
        buffer: Option<&[u8]>,
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

        let virtual_size = index.virtual_size();
        let mut run = ReservedRun::reserve(&self.vm, &mut index, base, count)?;
        drop(index);

        let Some(buffer) = buffer else {
            let filled = (0..count).try_for_each(|page| self.read_fill(&mut run, base, page, virtual_size));
            let mut index = self.vm.lock();
            return match filled {
                Ok(()) => {
                    run.finish(&mut index, count, PageState::Active);
                    Ok((index, size))
                },
                Err(err) => {
                    run.rollback(&mut index);
                    Err(err)
                },
            };
        };

        let data = &buffer[..size];
        let end = in_page + size;
        let last = count - 1;

        let mut filled = Ok(());
        if in_page != 0 || end < PAGE_SIZE {
            filled = self.read_fill(&mut run, base, 0, virtual_size);
        }
        if filled.is_ok() && last != 0 && end % PAGE_SIZE != 0 {
            filled = self.read_fill(&mut run, base, last, virtual_size);
        }
        if let Err(err) = filled {
            let mut index = self.vm.lock();
            run.rollback(&mut index);
            log::warn!(
                "filecache {}: write fill {:#x}+{:#x} failed: {}",
                self.node,
                offset,
                size,
                err
            );
            return Err(err);
        }

        run.copy_in(in_page, data);

        let mut state = PageState::Modified;
        let mut written_through = Ok(());
        if self.config.write_through {
            let len = virtual_size
                .saturating_sub(base)
                .min((count * PAGE_SIZE) as u64) as usize;
            written_through = match self.transfer(base, run.vecs(), len, IoDirection::Write) {
                Ok(n) if n >= len => {
                    state = PageState::Active;
                    self.stats.written_back_pages.add(count as u64);
                    Ok(())
                },
                Ok(_) => Err(CacheError::Io),
                Err(err) => Err(err),
            };
        }

        let mut index = self.vm.lock();
        run.finish(&mut index, count, state);

        if let Err(err) = written_through {
            log::warn!(
                "filecache {}: write-through {:#x}+{:#x} failed: {}",
                self.node,
                base,
                count * PAGE_SIZE,
                err
            );
            return Err(err);
        }
        Ok((index, size))
    }

    /// Load page `page` of `run` from the device. Bytes at or past the
    /// logical end of file are zeroed instead.
    fn read_fill(
        &self,
        run: &mut ReservedRun<'_>,
        base: u64,
        page: usize,
        virtual_size: u64,
    ) -> CacheResult<()> {
        let page_offset = base + page as u64 * PAGE_SIZE_U64;
        if page_offset >= virtual_size {
            run.zero_page_from(page, 0);
            return Ok(());
        }

        let vec = run.page_vec(page);
        let moved = self.transfer(page_offset, &[vec], PAGE_SIZE, IoDirection::Read)?;
        let valid = (virtual_size - page_offset).min(PAGE_SIZE_U64) as usize;
        run.zero_page_from(page, moved.min(valid));
        Ok(())
    }
}
