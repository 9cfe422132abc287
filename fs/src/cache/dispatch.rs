//! Cached I/O dispatch.
//!
//! A request is walked page by page under the cache lock. Resident pages
//! are copied directly; runs of absent pages ("gaps") are handed to the
//! read or write fill engine, which drops the lock for the device I/O.

use super::FileCache;
use crate::core::error::CacheResult;
use crate::core::types::{page_align_down, page_offset_of, pages_spanned, PAGE_SIZE_U64};
use crate::vm::{IndexGuard, PageMapping, PageState};

/// Caller side of a cached transfer
pub(crate) enum IoBuffer<'b> {
    /// Destination of a read
    Read(&'b mut [u8]),
    /// Source of a write
    Write(&'b [u8]),
}

impl IoBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Read(buf) => buf.len(),
            Self::Write(buf) => buf.len(),
        }
    }
}

impl FileCache {
    /// Transfer between `buffer` and the file at `offset` through the cache.
    ///
    /// The request is clipped to the logical size. Returns the bytes
    /// transferred; a short count means end of file or end of device data.
    pub(crate) fn cache_io(&self, offset: u64, mut buffer: IoBuffer<'_>) -> CacheResult<usize> {
        let mut index = self.vm.lock();
        let virtual_size = index.virtual_size();
        if offset >= virtual_size || buffer.len() == 0 {
            return Ok(0);
        }

        let size = (buffer.len() as u64).min(virtual_size - offset) as usize;
        let end = offset + size as u64;
        let max_gap = self.config.max_chunk_pages;

        let mut pos = offset;
        let mut gap_start: Option<u64> = None;

        while pos < end {
            let page_offset = page_align_down(pos);
            let chunk_end = (page_offset + PAGE_SIZE_U64).min(end);

            let page = match index.lookup(page_offset) {
                None => {
                    let start = *gap_start.get_or_insert(pos);
                    pos = chunk_end;
                    if pages_spanned(page_offset_of(start), (pos - start) as usize) >= max_gap {
                        gap_start = None;
                        let (guard, done) = self.service_gap(index, &mut buffer, offset, start, pos)?;
                        index = guard;
                        if done < (pos - start) as usize {
                            return Ok((start - offset) as usize + done);
                        }
                    }
                    continue;
                },
                Some(page) => page,
            };

            if let Some(start) = gap_start.take() {
                let (guard, done) = self.service_gap(index, &mut buffer, offset, start, pos)?;
                index = guard;
                if done < (pos - start) as usize {
                    return Ok((start - offset) as usize + done);
                }
                // the lock was dropped; look the page up again
                continue;
            }

            if page.is_busy() {
                self.stats.busy_waits.increment();
                index = self.vm.wait_for_busy(index);
                continue;
            }

            let in_page = page_offset_of(pos);
            let n = (chunk_end - pos) as usize;
            let at = (pos - offset) as usize;
            let mut mapping = PageMapping::map(self.vm.allocator(), page.frame)?;
            match &mut buffer {
                IoBuffer::Read(buf) => {
                    buf[at..at + n].copy_from_slice(&mapping.bytes()[in_page..in_page + n]);
                    self.stats.read_hits.increment();
                },
                IoBuffer::Write(buf) => {
                    mapping.bytes_mut()[in_page..in_page + n].copy_from_slice(&buf[at..at + n]);
                    index.set_state(page_offset, PageState::Modified);
                    self.stats.write_hits.increment();
                },
            }
            pos = chunk_end;
        }

        if let Some(start) = gap_start {
            let (_guard, done) = self.service_gap(index, &mut buffer, offset, start, end)?;
            if done < (end - start) as usize {
                return Ok((start - offset) as usize + done);
            }
        }

        Ok(size)
    }

    /// Fill the gap `[start, end)` of a request that began at `request`
    fn service_gap<'c>(
        &'c self,
        index: IndexGuard<'c>,
        buffer: &mut IoBuffer<'_>,
        request: u64,
        start: u64,
        end: u64,
    ) -> CacheResult<(IndexGuard<'c>, usize)> {
        let len = (end - start) as usize;
        let at = (start - request) as usize;

        match buffer {
            IoBuffer::Read(buf) => {
                self.stats.read_misses.increment();
                self.populate(index, start, len, Some(&mut buf[at..at + len]))
            },
            IoBuffer::Write(buf) => {
                self.stats.write_misses.increment();
                self.flush_fill(index, start, len, Some(&buf[at..at + len]))
            },
        }
    }
}
