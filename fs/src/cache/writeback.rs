//! Explicit write-back of modified pages.

use alloc::vec::Vec;

use arrayvec::ArrayVec;

use super::FileCache;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{page_align_down, IoDirection, PAGE_SIZE, PAGE_SIZE_U64};
use crate::io::iovec::{IoVecList, MAX_IO_VECS};
use crate::vm::{PageIndex, PageMapping, PageState, PhysPage};

impl FileCache {
    /// Write every modified page back to the device.
    ///
    /// Returns the number of pages written. Stops at the first failed run;
    /// its pages stay `Modified`.
    pub fn sync(&self) -> CacheResult<usize> {
        let written = self.write_back(0, u64::MAX)?;
        log::debug!("filecache {}: sync wrote {} pages", self.node, written);
        Ok(written)
    }

    /// Write back the modified pages overlapping `[start, end)`
    pub(crate) fn write_back(&self, start: u64, end: u64) -> CacheResult<usize> {
        let first = page_align_down(start);
        let offsets: Vec<u64> = self
            .vm
            .lock()
            .modified_offsets()
            .into_iter()
            .filter(|&offset| offset >= first && offset < end)
            .collect();

        let mut written = 0;
        let mut next = 0;
        while next < offsets.len() {
            let (claimed, result) = self.write_back_run(&offsets[next..]);
            written += result?;
            next += claimed.max(1);
        }
        Ok(written)
    }

    /// Claim the longest run of contiguous, still-modified pages at the
    /// head of `offsets` and write it. Returns how many offsets were
    /// consumed along with the pages written.
    fn write_back_run(&self, offsets: &[u64]) -> (usize, CacheResult<usize>) {
        let mut index = self.vm.lock();
        let base = offsets[0];
        let frames = claim_run(&mut index, offsets, self.config.max_chunk_pages);
        if frames.is_empty() {
            return (0, Ok(0));
        }
        let virtual_size = index.virtual_size();
        drop(index);

        let result = self.write_frames(base, &frames, virtual_size);

        let mut index = self.vm.lock();
        let state = if result.is_ok() {
            PageState::Active
        } else {
            PageState::Modified
        };
        for i in 0..frames.len() {
            index.set_state(base + i as u64 * PAGE_SIZE_U64, state);
        }
        self.vm.wake_waiters();
        drop(index);

        match result {
            Ok(()) => {
                self.stats.written_back_pages.add(frames.len() as u64);
                log::trace!(
                    "filecache {}: wrote back {:#x}+{} pages",
                    self.node,
                    base,
                    frames.len()
                );
                (frames.len(), Ok(frames.len()))
            },
            Err(err) => {
                log::warn!(
                    "filecache {}: write-back at {:#x} failed: {}",
                    self.node,
                    base,
                    err
                );
                (frames.len(), Err(err))
            },
        }
    }

    fn write_frames(&self, base: u64, frames: &[PhysPage], virtual_size: u64) -> CacheResult<()> {
        let allocator = self.vm.allocator();
        let mut mappings: ArrayVec<PageMapping<'_>, MAX_IO_VECS> = ArrayVec::new();
        let mut vecs: IoVecList = IoVecList::new();

        for &frame in frames {
            let mapping = PageMapping::map(allocator, frame)?;
            vecs.add_span(mapping.addr(), PAGE_SIZE)?;
            mappings
                .try_push(mapping)
                .map_err(|_| CacheError::Overflow)?;
        }

        // nothing past the logical end of file goes to the device
        let len = virtual_size
            .saturating_sub(base)
            .min((frames.len() * PAGE_SIZE) as u64) as usize;
        let moved = self.transfer(base, vecs.as_slice(), len, IoDirection::Write)?;
        crate::cache_ensure!(moved >= len, CacheError::Io);
        Ok(())
    }
}

/// Mark `Busy` the pages at the head of `offsets` that are contiguous and
/// still `Modified`, up to `max` of them.
fn claim_run(index: &mut PageIndex, offsets: &[u64], max: usize) -> ArrayVec<PhysPage, MAX_IO_VECS> {
    let mut frames = ArrayVec::new();
    let limit = max.min(MAX_IO_VECS);

    for (i, &offset) in offsets.iter().enumerate().take(limit) {
        if offset != offsets[0] + i as u64 * PAGE_SIZE_U64 {
            break;
        }
        match index.lookup(offset) {
            Some(page) if page.state == PageState::Modified => {
                index.set_state(offset, PageState::Busy);
                frames.push(page.frame);
            },
            _ => break,
        }
    }
    frames
}
