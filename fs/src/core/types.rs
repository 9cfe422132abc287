//! Primitive types shared across the cache engine.

use core::fmt;

use static_assertions::const_assert;

// ============================================================================
// Constants
// ============================================================================

/// Size of a cache page in bytes
pub const PAGE_SIZE: usize = 4096;

/// `PAGE_SIZE` as a file offset quantity
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Mask selecting the intra-page part of an offset
pub const PAGE_MASK: u64 = PAGE_SIZE_U64 - 1;

const_assert!(PAGE_SIZE.is_power_of_two());

// ============================================================================
// Alignment Helpers
// ============================================================================

/// Round an offset down to its page boundary
#[inline]
pub const fn page_align_down(offset: u64) -> u64 {
    offset & !PAGE_MASK
}

/// Round an offset up to the next page boundary.
///
/// Offsets inside the last page of the address space saturate to
/// `u64::MAX`.
#[inline]
pub const fn page_align_up(offset: u64) -> u64 {
    match offset.checked_add(PAGE_MASK) {
        Some(end) => end & !PAGE_MASK,
        None => u64::MAX,
    }
}

/// Position of an offset inside its page
#[inline]
pub const fn page_offset_of(offset: u64) -> usize {
    (offset & PAGE_MASK) as usize
}

/// Number of pages needed to cover `len` bytes starting `in_page` bytes
/// into the first page
#[inline]
pub const fn pages_spanned(in_page: usize, len: usize) -> usize {
    (in_page + len + PAGE_SIZE - 1) / PAGE_SIZE
}

// ============================================================================
// Identifiers
// ============================================================================

/// Mounted device (volume) identifier
pub type DeviceId = u32;

/// File node identifier, unique within a device
pub type NodeId = u64;

/// Descriptor through which the owning filesystem opened its device
pub type DeviceFd = i32;

/// Back-reference to the file node a cache belongs to.
///
/// Only identifies the node; it never keeps the node alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    /// Device the node lives on
    pub device: DeviceId,
    /// Node number on that device
    pub node: NodeId,
}

impl NodeRef {
    /// Create a node reference
    pub const fn new(device: DeviceId, node: NodeId) -> Self {
        Self { device, node }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.node)
    }
}

// ============================================================================
// Addresses
// ============================================================================

/// Kernel virtual address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Wrap a raw address
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Address of a pointer
    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Address `bytes` further on
    #[inline]
    pub const fn add(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }

    /// As a byte pointer
    #[inline]
    pub const fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }

    /// As a mutable byte pointer
    #[inline]
    pub const fn as_mut_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#x})", self.0)
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Direction of a transfer, seen from memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDirection {
    /// Device to memory
    Read,
    /// Memory to device
    Write,
}
