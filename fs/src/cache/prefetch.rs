//! Read-ahead.

use super::FileCache;
use crate::core::types::{page_align_down, pages_spanned, PAGE_SIZE_U64};

impl FileCache {
    /// Populate absent pages in `[offset, offset + size)` without copying
    /// anything out. Returns the number of pages brought in.
    ///
    /// Advisory: resident and busy pages are skipped, failures are logged
    /// and end the prefetch quietly.
    pub fn prefetch_range(&self, offset: u64, size: u64) -> usize {
        let mut index = self.vm.lock();
        let virtual_size = index.virtual_size();
        if offset >= virtual_size || size == 0 {
            return 0;
        }

        let end = offset.saturating_add(size).min(virtual_size);
        let max_gap = self.config.max_chunk_pages as u64;
        let mut pos = page_align_down(offset);
        let mut gap_start: Option<u64> = None;
        let mut warmed = 0;

        while pos < end {
            let absent = index.lookup(pos).is_none();
            if absent {
                gap_start.get_or_insert(pos);
                pos += PAGE_SIZE_U64;
            }

            let Some(start) = gap_start else {
                pos += PAGE_SIZE_U64;
                continue;
            };
            let gap_full = (pos - start) / PAGE_SIZE_U64 >= max_gap;
            if absent && !gap_full && pos < end {
                continue;
            }

            gap_start = None;
            let len = (pos.min(end) - start) as usize;
            match self.populate(index, start, len, None) {
                Ok((guard, done)) => {
                    index = guard;
                    warmed += pages_spanned(0, done);
                    if done < len {
                        break;
                    }
                },
                Err(err) => {
                    log::debug!(
                        "filecache {}: prefetch {:#x}+{:#x} abandoned: {}",
                        self.node,
                        start,
                        len,
                        err
                    );
                    break;
                },
            }
            if !absent {
                // skip the resident or busy page that ended the gap
                pos += PAGE_SIZE_U64;
            }
        }

        self.stats.prefetched_pages.add(warmed as u64);
        warmed
    }
}
