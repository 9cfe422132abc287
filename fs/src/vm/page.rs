//! Physical pages, page states and temporary kernel mappings.

use core::fmt;

use crate::core::error::CacheResult;
use crate::core::types::{VirtAddr, PAGE_SIZE};

// ============================================================================
// Physical Pages
// ============================================================================

/// Physical page frame number
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PhysPage(pub u64);

impl fmt::Debug for PhysPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysPage({:#x})", self.0)
    }
}

/// Page state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageState {
    /// Not holding file data
    Free     = 0,
    /// I/O in flight; contents are not yet valid
    Busy     = 1,
    /// Clean, matches the device
    Active   = 2,
    /// Holds writes that have not reached the device
    Modified = 3,
}

impl PageState {
    /// Can the page contents be read or written directly?
    #[inline]
    pub const fn is_resident(self) -> bool {
        matches!(self, Self::Active | Self::Modified)
    }
}

/// A page as recorded in the page index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedPage {
    /// Backing frame
    pub frame: PhysPage,
    /// Current state
    pub state: PageState,
}

impl CachedPage {
    /// A freshly allocated page under I/O
    pub const fn busy(frame: PhysPage) -> Self {
        Self {
            frame,
            state: PageState::Busy,
        }
    }

    /// Is I/O in flight?
    #[inline]
    pub const fn is_busy(&self) -> bool {
        matches!(self.state, PageState::Busy)
    }
}

// ============================================================================
// Page Allocator
// ============================================================================

/// Physical page provider of the VM subsystem.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - `map_temporarily` returns the address of `PAGE_SIZE` readable and
///   writable bytes backed by the given frame, valid until `unmap`
/// - each successful `map_temporarily` yields a mapping no other live
///   mapping aliases
/// - a frame is never handed out again before `free_page` is called on it
pub unsafe trait PageAllocator: Send + Sync {
    /// Allocate one page frame
    fn allocate_page(&self) -> CacheResult<PhysPage>;

    /// Return a frame to the allocator
    fn free_page(&self, page: PhysPage);

    /// Map a frame into kernel address space
    fn map_temporarily(&self, page: PhysPage) -> CacheResult<VirtAddr>;

    /// Tear down a mapping created by `map_temporarily`
    fn unmap(&self, addr: VirtAddr);
}

// ============================================================================
// Temporary Mapping
// ============================================================================

/// A page mapped into kernel space, unmapped on drop
pub struct PageMapping<'a> {
    allocator: &'a dyn PageAllocator,
    addr: VirtAddr,
}

impl<'a> PageMapping<'a> {
    /// Map `page` through `allocator`
    pub fn map(allocator: &'a dyn PageAllocator, page: PhysPage) -> CacheResult<Self> {
        let addr = allocator.map_temporarily(page)?;
        Ok(Self { allocator, addr })
    }

    /// Kernel address of the first byte
    #[inline]
    pub fn addr(&self) -> VirtAddr {
        self.addr
    }

    /// Page contents
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: PageAllocator guarantees PAGE_SIZE valid, unaliased bytes
        // at `addr` until unmap, which only happens in our Drop.
        unsafe { core::slice::from_raw_parts(self.addr.as_ptr(), PAGE_SIZE) }
    }

    /// Mutable page contents
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `bytes`; `&mut self` makes this the only view.
        unsafe { core::slice::from_raw_parts_mut(self.addr.as_mut_ptr(), PAGE_SIZE) }
    }
}

impl Drop for PageMapping<'_> {
    fn drop(&mut self) {
        self.allocator.unmap(self.addr);
    }
}

impl fmt::Debug for PageMapping<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageMapping").field("addr", &self.addr).finish()
    }
}
