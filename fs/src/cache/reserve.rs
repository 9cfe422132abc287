//! Busy-page reservation shared by population and flush.
//!
//! A run of absent pages is allocated, inserted as `Busy` and mapped while
//! the cache lock is held. The run is then filled with the lock released
//! and finally either completed or rolled back under the lock again.

use arrayvec::ArrayVec;

use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{PAGE_SIZE, PAGE_SIZE_U64};
use crate::io::iovec::{IoVec, IoVecList, MAX_IO_VECS};
use crate::vm::{CachedPage, PageIndex, PageMapping, PageState, PhysPage, VmCache};

/// Pages reserved by one populate/flush call
#[must_use = "a reserved run must be finished or rolled back"]
pub(crate) struct ReservedRun<'c> {
    vm: &'c VmCache,
    base: u64,
    frames: ArrayVec<PhysPage, MAX_IO_VECS>,
    mappings: ArrayVec<PageMapping<'c>, MAX_IO_VECS>,
    vecs: IoVecList,
}

impl<'c> ReservedRun<'c> {
    /// Reserve `count` pages starting at page-aligned `base`.
    ///
    /// On failure every page reserved so far is removed and freed.
    pub fn reserve(
        vm: &'c VmCache,
        index: &mut PageIndex,
        base: u64,
        count: usize,
    ) -> CacheResult<Self> {
        crate::cache_ensure!(count <= MAX_IO_VECS, CacheError::ResourceExhausted);

        let mut run = Self {
            vm,
            base,
            frames: ArrayVec::new(),
            mappings: ArrayVec::new(),
            vecs: IoVecList::new(),
        };

        for _ in 0..count {
            if let Err(err) = run.reserve_page(index) {
                run.rollback(index);
                return Err(err);
            }
        }
        Ok(run)
    }

    fn reserve_page(&mut self, index: &mut PageIndex) -> CacheResult<()> {
        let vm = self.vm;
        let allocator = vm.allocator();
        let offset = self.page_offset(self.frames.len());

        let frame = allocator.allocate_page()?;
        if let Err(err) = index.insert(offset, CachedPage::busy(frame)) {
            allocator.free_page(frame);
            return Err(err);
        }
        if self.frames.try_push(frame).is_err() {
            index.remove(offset);
            allocator.free_page(frame);
            return Err(CacheError::Overflow);
        }

        let mapping = PageMapping::map(allocator, frame)?;
        self.vecs.add_span(mapping.addr(), PAGE_SIZE)?;
        self.mappings
            .try_push(mapping)
            .map_err(|_| CacheError::Overflow)
    }

    #[inline]
    fn page_offset(&self, page: usize) -> u64 {
        self.base + page as u64 * PAGE_SIZE_U64
    }

    /// Number of pages in the run
    pub fn page_count(&self) -> usize {
        self.frames.len()
    }

    /// Coalesced vectors describing the whole run
    pub fn vecs(&self) -> &[IoVec] {
        self.vecs.as_slice()
    }

    /// Vector describing page `page` alone
    pub fn page_vec(&self, page: usize) -> IoVec {
        IoVec::new(self.mappings[page].addr(), PAGE_SIZE)
    }

    /// Zero every byte of the run at or past run-relative `from`
    pub fn zero_from(&mut self, from: usize) {
        for (i, mapping) in self.mappings.iter_mut().enumerate() {
            let start = i * PAGE_SIZE;
            if from <= start {
                mapping.bytes_mut().fill(0);
            } else if from < start + PAGE_SIZE {
                mapping.bytes_mut()[from - start..].fill(0);
            }
        }
    }

    /// Zero page `page` from in-page offset `from` onward
    pub fn zero_page_from(&mut self, page: usize, from: usize) {
        if from < PAGE_SIZE {
            self.mappings[page].bytes_mut()[from..].fill(0);
        }
    }

    /// Copy run bytes starting at run-relative `start` into `dest`
    pub fn copy_out(&self, start: usize, dest: &mut [u8]) {
        let mut done = 0;
        while done < dest.len() {
            let pos = start + done;
            let (page, in_page) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
            let n = (PAGE_SIZE - in_page).min(dest.len() - done);
            dest[done..done + n].copy_from_slice(&self.mappings[page].bytes()[in_page..in_page + n]);
            done += n;
        }
    }

    /// Copy `src` into the run starting at run-relative `start`
    pub fn copy_in(&mut self, start: usize, src: &[u8]) {
        let mut done = 0;
        while done < src.len() {
            let pos = start + done;
            let (page, in_page) = (pos / PAGE_SIZE, pos % PAGE_SIZE);
            let n = (PAGE_SIZE - in_page).min(src.len() - done);
            self.mappings[page].bytes_mut()[in_page..in_page + n].copy_from_slice(&src[done..done + n]);
            done += n;
        }
    }

    /// Remove every page of the run from the index and free its frame.
    pub fn rollback(mut self, index: &mut PageIndex) {
        self.mappings.clear();
        for (i, &frame) in self.frames.iter().enumerate() {
            let offset = self.page_offset(i);
            if index.lookup(offset).map(|page| page.frame) == Some(frame) {
                index.remove(offset);
            }
            self.vm.allocator().free_page(frame);
        }
        self.vm.wake_waiters();
    }

    /// Publish the first `keep` pages in `state`; the rest hold no data and
    /// are removed.
    pub fn finish(mut self, index: &mut PageIndex, keep: usize, state: PageState) {
        self.mappings.clear();
        for (i, &frame) in self.frames.iter().enumerate() {
            let offset = self.page_offset(i);
            if i < keep {
                index.set_state(offset, state);
            } else {
                index.remove(offset);
                self.vm.allocator().free_page(frame);
            }
        }
        self.vm.wake_waiters();
    }
}
