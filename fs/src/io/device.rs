//! Block device collaborator.
//!
//! The cache never owns a driver. It is handed a [`DeviceHandle`] by the
//! [`DeviceTable`] when a cache is created, and the handle gives the open
//! cookie back to the device when the last cache reference goes away.

use alloc::sync::Arc;
use core::fmt;

use super::iovec::IoVec;
use crate::core::error::CacheResult;
use crate::core::types::{DeviceFd, IoDirection};

/// Opaque per-open state handed out by a device.
///
/// Not `Clone`: exactly one owner exists and it is given back through
/// [`BlockDevice::release`].
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceCookie(pub u64);

/// Block-addressed device
pub trait BlockDevice: Send + Sync {
    /// Transfer bytes between `vecs` and the device starting at byte
    /// `device_offset`.
    ///
    /// Returns the bytes moved. A short count is not an error.
    fn transfer(
        &self,
        cookie: &DeviceCookie,
        device_offset: u64,
        vecs: &[IoVec],
        direction: IoDirection,
    ) -> CacheResult<usize>;

    /// Give back an open cookie
    fn release(&self, cookie: DeviceCookie);
}

/// Resolves a filesystem's device descriptor to an open device
pub trait DeviceTable: Send + Sync {
    /// Open the device behind `fd`
    ///
    /// Fails with `BadFileDescriptor` if `fd` does not refer to a device.
    fn open(&self, fd: DeviceFd) -> CacheResult<DeviceHandle>;
}

// ============================================================================
// Device Handle
// ============================================================================

/// Owned reference to a device together with its open cookie
pub struct DeviceHandle {
    device: Arc<dyn BlockDevice>,
    cookie: Option<DeviceCookie>,
}

impl DeviceHandle {
    /// Wrap an opened device
    pub fn new(device: Arc<dyn BlockDevice>, cookie: DeviceCookie) -> Self {
        Self {
            device,
            cookie: Some(cookie),
        }
    }

    /// Transfer through the held cookie
    pub fn transfer(
        &self,
        device_offset: u64,
        vecs: &[IoVec],
        direction: IoDirection,
    ) -> CacheResult<usize> {
        match &self.cookie {
            Some(cookie) => self.device.transfer(cookie, device_offset, vecs, direction),
            None => Ok(0),
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.take() {
            self.device.release(cookie);
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("cookie", &self.cookie)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDevice;

    #[test]
    fn test_handle_releases_cookie_once() {
        let device = Arc::new(MemoryDevice::new(4096));
        let handle = DeviceHandle::new(device.clone(), DeviceCookie(7));
        assert_eq!(device.releases(), 0);
        drop(handle);
        assert_eq!(device.releases(), 1);
        assert_eq!(device.last_released(), Some(7));
    }

    #[test]
    fn test_handle_transfers_through_cookie() {
        let device = Arc::new(MemoryDevice::with_pattern(4096, 0x5A));
        let handle = DeviceHandle::new(device.clone(), DeviceCookie(1));
        let mut buf = [0u8; 32];
        let vec = IoVec::from_mut_slice(&mut buf);
        let moved = handle.transfer(100, &[vec], IoDirection::Read).unwrap();
        assert_eq!(moved, 32);
        assert!(buf.iter().all(|&b| b == 0x5A));
    }
}
