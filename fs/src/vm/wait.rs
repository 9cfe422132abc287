//! Waiting for busy pages.
//!
//! Every transition out of `Busy` advances a per-cache sequence word and
//! wakes everyone sleeping on it. A waiter records the word while holding
//! the cache lock, so a wakeup issued after it saw a busy page always
//! changes the word it sleeps on.

use alloc::sync::Arc;
use core::fmt;

use crate::core::atomic::{AtomicU32, SequenceWord, ACQUIRE};

/// Address-based sleep/wake primitive supplied by the scheduler
pub trait Futex: Send + Sync {
    /// Block while `word` still holds `expected`.
    ///
    /// May return spuriously; callers re-check.
    fn wait(&self, word: &AtomicU32, expected: u32);

    /// Wake every thread blocked on `word`
    fn wake_all(&self, word: &AtomicU32);
}

/// Busy-polling futex for contexts without a scheduler
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinFutex;

impl Futex for SpinFutex {
    fn wait(&self, word: &AtomicU32, expected: u32) {
        while word.load(ACQUIRE) == expected {
            core::hint::spin_loop();
        }
    }

    fn wake_all(&self, _word: &AtomicU32) {}
}

/// Wait queue shared by all pages of one cache
pub struct BusyWaitQueue {
    seq: SequenceWord,
    futex: Arc<dyn Futex>,
}

impl BusyWaitQueue {
    /// Create a queue sleeping through `futex`
    pub fn new(futex: Arc<dyn Futex>) -> Self {
        Self {
            seq: SequenceWord::new(),
            futex,
        }
    }

    /// Record the current sequence. Must be called with the cache lock held.
    #[inline]
    pub fn ticket(&self) -> u32 {
        self.seq.current()
    }

    /// Sleep until a wakeup newer than `ticket` has been issued
    pub fn wait(&self, ticket: u32) {
        while self.seq.current() == ticket {
            self.futex.wait(self.seq.as_atomic(), ticket);
        }
    }

    /// Wake every waiter
    pub fn wake_all(&self) {
        self.seq.advance();
        self.futex.wake_all(self.seq.as_atomic());
    }
}

impl fmt::Debug for BusyWaitQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusyWaitQueue")
            .field("seq", &self.seq.current())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StdFutex;
    use std::thread;

    #[test]
    fn test_wait_returns_after_wake() {
        let queue = Arc::new(BusyWaitQueue::new(Arc::new(StdFutex::default())));
        let ticket = queue.ticket();

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait(ticket))
        };

        queue.wake_all();
        waiter.join().unwrap();
        assert_ne!(queue.ticket(), ticket);
    }

    #[test]
    fn test_stale_ticket_does_not_block() {
        let queue = BusyWaitQueue::new(Arc::new(SpinFutex));
        let ticket = queue.ticket();
        queue.wake_all();
        queue.wait(ticket);
    }
}
