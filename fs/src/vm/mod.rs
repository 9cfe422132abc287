//! VM-side objects the cache engine works against.
//!
//! The page index, page states, the physical page allocator interface and
//! the busy-page wait queue.

pub mod cache;
pub mod page;
pub mod wait;

pub use cache::{IndexGuard, PageIndex, VmCache};
pub use page::{CachedPage, PageAllocator, PageMapping, PageState, PhysPage};
pub use wait::{BusyWaitQueue, Futex, SpinFutex};
