//! Error types and result handling for the file cache.
//!
//! Every failure the engine can report is a [`CacheError`]. Lower layers
//! (device, extent map, page allocator) report through the same type so a
//! failure propagates unchanged from the collaborator to the caller of the
//! cache operation.

use core::fmt;

/// Result type alias for file cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Error type for file cache operations.
///
/// Codes are grouped by the layer that raises them. Requests that fall
/// outside the file are not errors: they are clipped and succeed with zero
/// bytes transferred.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum CacheError {
    // ========================================================================
    // Device / Mapping Errors (1-99)
    // ========================================================================
    /// Device transfer failed
    Io                   = 1,

    /// The extent map could not resolve the requested file range
    NotFound             = 2,

    /// Device file descriptor does not refer to an open device
    BadFileDescriptor    = 3,

    // ========================================================================
    // Resource Errors (100-199)
    // ========================================================================
    /// Physical page allocation or temporary mapping failed
    OutOfMemory          = 100,

    /// Fixed-capacity scatter/gather list exceeded
    Overflow             = 101,

    /// Request exceeds the per-call page bound
    ResourceExhausted    = 102,

    // ========================================================================
    // Usage Errors (200-299)
    // ========================================================================
    /// Invalid argument or configuration value
    InvalidArgument      = 200,

    /// Slot already occupied (page index offset, registered cache)
    AlreadyExists        = 201,
}

impl CacheError {
    /// Convert error code to errno-compatible value
    pub const fn to_errno(self) -> i32 {
        match self {
            Self::Io => 5,                 // EIO
            Self::NotFound => 2,           // ENOENT
            Self::BadFileDescriptor => 9,  // EBADF
            Self::OutOfMemory => 12,       // ENOMEM
            Self::Overflow => 75,          // EOVERFLOW
            Self::ResourceExhausted => 105, // ENOBUFS
            Self::InvalidArgument => 22,   // EINVAL
            Self::AlreadyExists => 17,     // EEXIST
        }
    }

    /// Get human-readable error message
    pub const fn message(self) -> &'static str {
        match self {
            Self::Io => "I/O error",
            Self::NotFound => "File range not mapped",
            Self::BadFileDescriptor => "Bad device file descriptor",
            Self::OutOfMemory => "Out of memory",
            Self::Overflow => "I/O vector list overflow",
            Self::ResourceExhausted => "Request exceeds page bound",
            Self::InvalidArgument => "Invalid argument",
            Self::AlreadyExists => "Already exists",
        }
    }

    /// Check if this error came from the device path rather than from
    /// resource limits or caller mistakes
    pub const fn is_device_error(self) -> bool {
        matches!(self, Self::Io | Self::NotFound)
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

// ============================================================================
// Helper Macros
// ============================================================================

/// Ensure a condition is true, returning error if not.
#[macro_export]
macro_rules! cache_ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
