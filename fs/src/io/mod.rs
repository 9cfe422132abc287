//! I/O layer for the file cache.
//!
//! Scatter/gather lists plus the device and extent-map collaborators.

pub mod device;
pub mod extent;
pub mod iovec;

pub use device::*;
pub use extent::*;
pub use iovec::*;
