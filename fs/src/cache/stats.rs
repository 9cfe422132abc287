//! Per-cache counters.

use crate::core::atomic::AtomicCounter;

/// Live counters of one file cache
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Pages read straight from the cache
    pub read_hits: AtomicCounter,
    /// Gaps populated for reads
    pub read_misses: AtomicCounter,
    /// Pages written straight into the cache
    pub write_hits: AtomicCounter,
    /// Gaps filled for writes
    pub write_misses: AtomicCounter,
    /// Bytes returned by `read`
    pub bytes_read: AtomicCounter,
    /// Bytes accepted by `write`
    pub bytes_written: AtomicCounter,
    /// Pages brought in by prefetch
    pub prefetched_pages: AtomicCounter,
    /// Pages written back to the device
    pub written_back_pages: AtomicCounter,
    /// Times a request slept on a busy page
    pub busy_waits: AtomicCounter,
    /// Failed device or extent-map calls
    pub io_errors: AtomicCounter,
}

impl CacheStats {
    /// Create zeroed counters
    pub const fn new() -> Self {
        Self {
            read_hits: AtomicCounter::new(0),
            read_misses: AtomicCounter::new(0),
            write_hits: AtomicCounter::new(0),
            write_misses: AtomicCounter::new(0),
            bytes_read: AtomicCounter::new(0),
            bytes_written: AtomicCounter::new(0),
            prefetched_pages: AtomicCounter::new(0),
            written_back_pages: AtomicCounter::new(0),
            busy_waits: AtomicCounter::new(0),
            io_errors: AtomicCounter::new(0),
        }
    }

    /// Point-in-time copy
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            read_hits: self.read_hits.load(),
            read_misses: self.read_misses.load(),
            write_hits: self.write_hits.load(),
            write_misses: self.write_misses.load(),
            bytes_read: self.bytes_read.load(),
            bytes_written: self.bytes_written.load(),
            prefetched_pages: self.prefetched_pages.load(),
            written_back_pages: self.written_back_pages.load(),
            busy_waits: self.busy_waits.load(),
            io_errors: self.io_errors.load(),
        }
    }
}

/// Snapshot of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Pages read straight from the cache
    pub read_hits: u64,
    /// Gaps populated for reads
    pub read_misses: u64,
    /// Pages written straight into the cache
    pub write_hits: u64,
    /// Gaps filled for writes
    pub write_misses: u64,
    /// Bytes returned by `read`
    pub bytes_read: u64,
    /// Bytes accepted by `write`
    pub bytes_written: u64,
    /// Pages brought in by prefetch
    pub prefetched_pages: u64,
    /// Pages written back to the device
    pub written_back_pages: u64,
    /// Times a request slept on a busy page
    pub busy_waits: u64,
    /// Failed device or extent-map calls
    pub io_errors: u64,
}

impl CacheStatsSnapshot {
    /// Fraction of page accesses served without device I/O, in percent
    pub fn hit_ratio_percent(&self) -> u64 {
        let hits = self.read_hits + self.write_hits;
        let total = hits + self.read_misses + self.write_misses;
        if total == 0 {
            0
        } else {
            hits * 100 / total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_ratio() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_ratio_percent(), 0);

        stats.read_hits.add(3);
        stats.read_misses.increment();
        let snap = stats.snapshot();
        assert_eq!(snap.read_hits, 3);
        assert_eq!(snap.hit_ratio_percent(), 75);
    }
}
