//! # Helix File Cache
//!
//! Kernel-resident page cache that sits between byte-range file I/O and a
//! block-addressed device.
//!
//! ## Components
//!
//! - **IoVector Builder** ([`io::iovec`]): bounded scatter/gather lists
//!   with coalescing of contiguous spans
//! - **File Cache** ([`cache`]): extent translation, read and write fill,
//!   the cached I/O dispatcher, prefetch and write-back
//! - **VM objects** ([`vm`]): page index, page states, temporary mappings
//!   and the busy-page wait queue
//! - **Manager** ([`manager`]): cache lifecycle and registry
//!
//! ## Locking
//!
//! Each [`vm::VmCache`] has one lock guarding its page index, its logical
//! size and every page state. Device I/O never runs with that lock held;
//! pages under I/O are marked `Busy` and other threads wait on the cache's
//! wait queue until they leave that state.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod accounting;
pub mod cache;
pub mod core;
pub mod io;
pub mod manager;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::accounting::{CacheAccounting, NodeInfo, NoopAccounting};
pub use crate::cache::{CacheStatsSnapshot, FileCache};
pub use crate::core::{CacheError, CacheResult, FileCacheConfig, PAGE_SIZE};
pub use crate::io::{BlockDevice, DeviceCookie, DeviceHandle, DeviceTable, ExtentMap, FileExtent, IoVec};
pub use crate::manager::FileCacheManager;
pub use crate::vm::{Futex, PageAllocator, PhysPage, SpinFutex};
