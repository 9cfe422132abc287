//! VM cache object: the page index of one file and the lock guarding it.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;
use spin::{Mutex, MutexGuard};

use super::page::{CachedPage, PageAllocator, PageMapping, PageState};
use super::wait::{BusyWaitQueue, Futex};
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{page_align_up, page_offset_of, PAGE_MASK};

// ============================================================================
// Page Index
// ============================================================================

/// Resident pages keyed by page-aligned file offset, plus the logical size.
///
/// Only reachable through the cache lock.
#[derive(Debug, Default)]
pub struct PageIndex {
    pages: HashMap<u64, CachedPage>,
    virtual_size: u64,
}

/// Locked view of a cache's page index
pub type IndexGuard<'c> = MutexGuard<'c, PageIndex>;

impl PageIndex {
    /// Create an empty index for a file of `virtual_size` bytes
    pub fn new(virtual_size: u64) -> Self {
        Self {
            pages: HashMap::new(),
            virtual_size,
        }
    }

    /// Logical end of file
    #[inline]
    pub fn virtual_size(&self) -> u64 {
        self.virtual_size
    }

    /// Page at `offset`
    #[inline]
    pub fn lookup(&self, offset: u64) -> Option<CachedPage> {
        self.pages.get(&offset).copied()
    }

    /// Insert a page. An occupied slot is never replaced.
    pub fn insert(&mut self, offset: u64, page: CachedPage) -> CacheResult<()> {
        crate::cache_ensure!(offset & PAGE_MASK == 0, CacheError::InvalidArgument);
        match self.pages.entry(offset) {
            hashbrown::hash_map::Entry::Occupied(_) => Err(CacheError::AlreadyExists),
            hashbrown::hash_map::Entry::Vacant(slot) => {
                slot.insert(page);
                Ok(())
            }
        }
    }

    /// Remove the page at `offset`
    pub fn remove(&mut self, offset: u64) -> Option<CachedPage> {
        self.pages.remove(&offset)
    }

    /// Change the state of the page at `offset`. Returns false if absent.
    pub fn set_state(&mut self, offset: u64, state: PageState) -> bool {
        match self.pages.get_mut(&offset) {
            Some(page) => {
                page.state = state;
                true
            }
            None => false,
        }
    }

    /// Offsets of every `Modified` page, ascending
    pub fn modified_offsets(&self) -> Vec<u64> {
        let mut offsets: Vec<u64> = self
            .pages
            .iter()
            .filter(|(_, page)| page.state == PageState::Modified)
            .map(|(&offset, _)| offset)
            .collect();
        offsets.sort_unstable();
        offsets
    }

    /// Number of pages in the index
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Is the index empty?
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

// ============================================================================
// VM Cache
// ============================================================================

/// Page cache of one file
pub struct VmCache {
    index: Mutex<PageIndex>,
    waiters: BusyWaitQueue,
    allocator: Arc<dyn PageAllocator>,
}

impl VmCache {
    /// Create an empty cache for a file of `size` bytes
    pub fn new(size: u64, allocator: Arc<dyn PageAllocator>, futex: Arc<dyn Futex>) -> Self {
        Self {
            index: Mutex::new(PageIndex::new(size)),
            waiters: BusyWaitQueue::new(futex),
            allocator,
        }
    }

    /// Take the cache lock
    #[inline]
    pub fn lock(&self) -> IndexGuard<'_> {
        self.index.lock()
    }

    /// Page allocator backing this cache
    #[inline]
    pub fn allocator(&self) -> &dyn PageAllocator {
        &*self.allocator
    }

    /// Logical end of file
    pub fn virtual_size(&self) -> u64 {
        self.lock().virtual_size()
    }

    /// Number of pages in the index
    pub fn resident_pages(&self) -> usize {
        self.lock().len()
    }

    /// Release the lock, sleep until a busy page changes state, relock.
    pub fn wait_for_busy<'c>(&'c self, index: IndexGuard<'c>) -> IndexGuard<'c> {
        let ticket = self.waiters.ticket();
        drop(index);
        self.waiters.wait(ticket);
        self.lock()
    }

    /// Wake threads sleeping on busy pages. Call with the lock held, after
    /// the state change.
    #[inline]
    pub fn wake_waiters(&self) {
        self.waiters.wake_all();
    }

    /// Change the logical size.
    ///
    /// When shrinking, resident pages wholly past the new end are dropped and
    /// the tail of the page containing the new end is zeroed. Pages under I/O
    /// are left alone. Returns the number of pages dropped.
    pub fn resize(&self, new_size: u64) -> CacheResult<usize> {
        let mut index = self.lock();
        let old_size = index.virtual_size;
        index.virtual_size = new_size;

        if new_size >= old_size {
            return Ok(0);
        }

        let cutoff = page_align_up(new_size);
        let doomed: Vec<u64> = index
            .pages
            .iter()
            .filter(|&(&offset, page)| offset >= cutoff && !page.is_busy())
            .map(|(&offset, _)| offset)
            .collect();

        for &offset in &doomed {
            if let Some(page) = index.remove(offset) {
                self.allocator.free_page(page.frame);
            }
        }

        let in_page = page_offset_of(new_size);
        if in_page != 0 {
            if let Some(page) = index.lookup(new_size & !PAGE_MASK) {
                if page.state.is_resident() {
                    let mut mapping = PageMapping::map(self.allocator(), page.frame)?;
                    mapping.bytes_mut()[in_page..].fill(0);
                }
            }
        }

        Ok(doomed.len())
    }
}

impl Drop for VmCache {
    fn drop(&mut self) {
        let index = self.index.get_mut();
        for (_, page) in index.pages.drain() {
            self.allocator.free_page(page.frame);
        }
    }
}

impl fmt::Debug for VmCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index.lock();
        f.debug_struct("VmCache")
            .field("virtual_size", &index.virtual_size)
            .field("pages", &index.len())
            .finish_non_exhaustive()
    }
}
