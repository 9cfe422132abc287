//! Atomic counters for cache bookkeeping.
//!
//! Statistics are bumped from any thread without holding the cache lock,
//! so they live in plain atomics with relaxed-enough orderings.

pub use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

// ============================================================================
// Memory Ordering Helpers
// ============================================================================

/// Acquire ordering - subsequent reads see prior writes
pub const ACQUIRE: Ordering = Ordering::Acquire;

/// Acquire-Release ordering - both acquire and release
pub const ACQ_REL: Ordering = Ordering::AcqRel;

// ============================================================================
// Atomic Counter
// ============================================================================

/// Monotonic event counter.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a new counter with initial value
    #[inline]
    pub const fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Load current value
    #[inline]
    pub fn load(&self) -> u64 {
        self.value.load(ACQUIRE)
    }

    /// Increment and return new value
    #[inline]
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, ACQ_REL) + 1
    }

    /// Add a value and return new value
    #[inline]
    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, ACQ_REL) + delta
    }
}

// ============================================================================
// Sequence Word
// ============================================================================

/// 32-bit sequence number that waiters sleep on.
///
/// Sized for futex-style waiting: the word itself is the wait address.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct SequenceWord {
    word: AtomicU32,
}

impl SequenceWord {
    /// Create a new sequence starting at zero
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
        }
    }

    /// Current sequence value
    #[inline]
    pub fn current(&self) -> u32 {
        self.word.load(ACQUIRE)
    }

    /// Advance the sequence, wrapping on overflow
    #[inline]
    pub fn advance(&self) -> u32 {
        self.word.fetch_add(1, ACQ_REL).wrapping_add(1)
    }

    /// The raw word, for handing to a futex
    #[inline]
    pub fn as_atomic(&self) -> &AtomicU32 {
        &self.word
    }
}
