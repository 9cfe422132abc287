//! In-memory collaborators for unit tests.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::accounting::{CacheAccounting, NodeInfo};
use crate::cache::{CacheStatsSnapshot, FileCache};
use crate::core::config::FileCacheConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{DeviceFd, IoDirection, NodeRef, VirtAddr, PAGE_SIZE};
use crate::io::device::{BlockDevice, DeviceCookie, DeviceHandle, DeviceTable};
use crate::io::extent::{ExtentMap, FileExtent};
use crate::io::iovec::IoVec;
use crate::manager::FileCacheManager;
use crate::vm::page::{PageAllocator, PhysPage};
use crate::vm::wait::Futex;

/// Byte stored at device offset `pos` by [`MemoryDevice::patterned`]
pub fn pattern(pos: u64) -> u8 {
    (pos % 251) as u8
}

/// Poll `cond` until it holds; panics after five seconds
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(1));
    }
}

// ============================================================================
// Page allocator
// ============================================================================

/// Fill byte of freshly allocated frames
pub const GARBAGE: u8 = 0xCD;

/// Heap-backed frames; the "mapping" is the frame's own address
pub struct HeapAllocator {
    frames: Mutex<HashMap<u64, Box<[u8; PAGE_SIZE]>>>,
    next: AtomicU64,
    mapped: AtomicUsize,
    budget: Mutex<Option<usize>>,
    fail_maps: AtomicBool,
    watch: Mutex<Option<Arc<InFlight>>>,
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
            mapped: AtomicUsize::new(0),
            budget: Mutex::new(None),
            fail_maps: AtomicBool::new(false),
            watch: Mutex::new(None),
        }
    }

    /// Report every mapping of a frame a device call is moving data through
    pub fn watch(&self, in_flight: Arc<InFlight>) {
        *self.watch.lock().unwrap() = Some(in_flight);
    }

    /// Let `n` more allocations succeed, then fail with `OutOfMemory`
    pub fn fail_after(&self, n: usize) {
        *self.budget.lock().unwrap() = Some(n);
    }

    pub fn fail_maps(&self, fail: bool) {
        self.fail_maps.store(fail, Ordering::SeqCst);
    }

    pub fn live_pages(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn mapped_pages(&self) -> usize {
        self.mapped.load(Ordering::SeqCst)
    }
}

unsafe impl PageAllocator for HeapAllocator {
    fn allocate_page(&self) -> CacheResult<PhysPage> {
        if let Some(budget) = self.budget.lock().unwrap().as_mut() {
            if *budget == 0 {
                return Err(CacheError::OutOfMemory);
            }
            *budget -= 1;
        }
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.frames
            .lock()
            .unwrap()
            .insert(id, Box::new([GARBAGE; PAGE_SIZE]));
        Ok(PhysPage(id))
    }

    fn free_page(&self, page: PhysPage) {
        assert!(
            self.frames.lock().unwrap().remove(&page.0).is_some(),
            "double free of {:?}",
            page
        );
    }

    fn map_temporarily(&self, page: PhysPage) -> CacheResult<VirtAddr> {
        if self.fail_maps.load(Ordering::SeqCst) {
            return Err(CacheError::OutOfMemory);
        }
        let mut frames = self.frames.lock().unwrap();
        let frame = frames.get_mut(&page.0).ok_or(CacheError::InvalidArgument)?;
        let addr = VirtAddr::from_ptr(frame.as_mut_ptr());
        if let Some(in_flight) = self.watch.lock().unwrap().as_ref() {
            in_flight.check_map(addr);
        }
        self.mapped.fetch_add(1, Ordering::SeqCst);
        Ok(addr)
    }

    fn unmap(&self, _addr: VirtAddr) {
        self.mapped.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Device
// ============================================================================

/// One recorded device call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCall {
    pub device_offset: u64,
    pub len: usize,
    pub direction: IoDirection,
}

/// Memory ranges device calls are moving data through right now.
///
/// A frame in one of these ranges belongs to a `Busy` page; mapping it
/// from anywhere but the call that owns it is a violation.
#[derive(Default)]
pub struct InFlight {
    ranges: Mutex<Vec<(usize, usize)>>,
    violations: AtomicUsize,
}

impl InFlight {
    fn enter(&self, vecs: &[IoVec]) {
        let mut ranges = self.ranges.lock().unwrap();
        ranges.extend(vecs.iter().map(|v| (v.base.as_ptr() as usize, v.len)));
    }

    fn leave(&self, vecs: &[IoVec]) {
        let mut ranges = self.ranges.lock().unwrap();
        for vec in vecs {
            let entry = (vec.base.as_ptr() as usize, vec.len);
            if let Some(at) = ranges.iter().position(|&r| r == entry) {
                ranges.swap_remove(at);
            }
        }
    }

    fn check_map(&self, addr: VirtAddr) {
        let addr = addr.as_ptr() as usize;
        let ranges = self.ranges.lock().unwrap();
        if ranges.iter().any(|&(base, len)| addr >= base && addr < base + len) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Gate {
    closed: bool,
    parked: usize,
}

/// Vec-backed block device. Transfers stop short at the end of the data.
pub struct MemoryDevice {
    data: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay_ms: AtomicU64,
    gate: Mutex<Gate>,
    gate_open: Condvar,
    in_flight: Arc<InFlight>,
    calls: Mutex<Vec<DeviceCall>>,
    releases: AtomicUsize,
    last_released: Mutex<Option<u64>>,
}

impl MemoryDevice {
    pub fn new(len: usize) -> Self {
        Self::from_bytes(alloc::vec![0; len])
    }

    pub fn with_pattern(len: usize, byte: u8) -> Self {
        Self::from_bytes(alloc::vec![byte; len])
    }

    /// Device whose byte at `pos` is `pattern(pos)`
    pub fn patterned(len: usize) -> Self {
        Self::from_bytes((0..len as u64).map(pattern).collect())
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            gate: Mutex::new(Gate::default()),
            gate_open: Condvar::new(),
            in_flight: Arc::new(InFlight::default()),
            calls: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            last_released: Mutex::new(None),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Sleep inside every transfer
    pub fn set_delay(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Hold every transfer inside the device until `open_gate`
    pub fn close_gate(&self) {
        self.gate.lock().unwrap().closed = true;
    }

    pub fn open_gate(&self) {
        self.gate.lock().unwrap().closed = false;
        self.gate_open.notify_all();
    }

    /// Transfers currently held at the gate
    pub fn parked(&self) -> usize {
        self.gate.lock().unwrap().parked
    }

    pub fn in_flight(&self) -> Arc<InFlight> {
        self.in_flight.clone()
    }

    fn pass_gate(&self) {
        let mut gate = self.gate.lock().unwrap();
        if gate.closed {
            gate.parked += 1;
            while gate.closed {
                gate = self.gate_open.wait(gate).unwrap();
            }
            gate.parked -= 1;
        }
    }

    pub fn contents(&self, start: usize, len: usize) -> Vec<u8> {
        self.data.lock().unwrap()[start..start + len].to_vec()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn last_released(&self) -> Option<u64> {
        *self.last_released.lock().unwrap()
    }

    fn move_data(&self, device_offset: u64, vecs: &[IoVec], direction: IoDirection) -> CacheResult<usize> {
        self.pass_gate();

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        let failing = match direction {
            IoDirection::Read => &self.fail_reads,
            IoDirection::Write => &self.fail_writes,
        };
        if failing.load(Ordering::SeqCst) {
            return Err(CacheError::Io);
        }

        self.calls.lock().unwrap().push(DeviceCall {
            device_offset,
            len: crate::io::iovec::total_len(vecs),
            direction,
        });

        let mut data = self.data.lock().unwrap();
        let mut pos = device_offset as usize;
        let mut moved = 0;
        for vec in vecs {
            if pos >= data.len() {
                break;
            }
            let n = vec.len.min(data.len() - pos);
            unsafe {
                match direction {
                    IoDirection::Read => {
                        core::ptr::copy_nonoverlapping(data[pos..].as_ptr(), vec.base.as_mut_ptr(), n)
                    },
                    IoDirection::Write => {
                        core::ptr::copy_nonoverlapping(vec.base.as_ptr(), data[pos..].as_mut_ptr(), n)
                    },
                }
            }
            pos += n;
            moved += n;
            if n < vec.len {
                break;
            }
        }
        Ok(moved)
    }
}

impl BlockDevice for MemoryDevice {
    fn transfer(
        &self,
        _cookie: &DeviceCookie,
        device_offset: u64,
        vecs: &[IoVec],
        direction: IoDirection,
    ) -> CacheResult<usize> {
        self.in_flight.enter(vecs);
        let result = self.move_data(device_offset, vecs, direction);
        self.in_flight.leave(vecs);
        result
    }

    fn release(&self, cookie: DeviceCookie) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        *self.last_released.lock().unwrap() = Some(cookie.0);
    }
}

/// Maps descriptors to memory devices; the cookie is the descriptor
#[derive(Default)]
pub struct MemoryDeviceTable {
    devices: Mutex<HashMap<DeviceFd, Arc<MemoryDevice>>>,
}

impl MemoryDeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, fd: DeviceFd, device: Arc<MemoryDevice>) {
        self.devices.lock().unwrap().insert(fd, device);
    }
}

impl DeviceTable for MemoryDeviceTable {
    fn open(&self, fd: DeviceFd) -> CacheResult<DeviceHandle> {
        let device = self
            .devices
            .lock()
            .unwrap()
            .get(&fd)
            .cloned()
            .ok_or(CacheError::BadFileDescriptor)?;
        Ok(DeviceHandle::new(device, DeviceCookie(fd as u64)))
    }
}

// ============================================================================
// Extent maps
// ============================================================================

/// File offset N lives at device offset `base + N`
pub struct LinearExtents {
    pub base: u64,
}

impl ExtentMap for LinearExtents {
    fn resolve(
        &self,
        _node: NodeRef,
        offset: u64,
        len: usize,
        _max_extents: usize,
    ) -> CacheResult<Vec<FileExtent>> {
        Ok(alloc::vec![FileExtent::new(self.base + offset, len as u64)])
    }
}

/// File split in `chunk`-byte pieces; piece `k` lives at `placement[k]`
pub struct ScatteredExtents {
    pub chunk: u64,
    pub placement: Vec<u64>,
}

impl ScatteredExtents {
    /// Pieces stored in reverse order starting at device offset 0
    pub fn reversed(chunk: u64, pieces: usize) -> Self {
        Self {
            chunk,
            placement: (0..pieces as u64).rev().map(|k| k * chunk).collect(),
        }
    }
}

impl ExtentMap for ScatteredExtents {
    fn resolve(
        &self,
        _node: NodeRef,
        offset: u64,
        len: usize,
        max_extents: usize,
    ) -> CacheResult<Vec<FileExtent>> {
        let mut extents = Vec::new();
        let mut pos = offset;
        let end = offset + len as u64;
        while pos < end && extents.len() < max_extents {
            let piece = (pos / self.chunk) as usize;
            let Some(&start) = self.placement.get(piece) else {
                break;
            };
            let in_piece = pos % self.chunk;
            let run = (self.chunk - in_piece).min(end - pos);
            extents.push(FileExtent::new(start + in_piece, run));
            pos += run;
        }
        if extents.is_empty() {
            return Err(CacheError::NotFound);
        }
        Ok(extents)
    }
}

/// Resolves nothing
pub struct MissingExtents;

impl ExtentMap for MissingExtents {
    fn resolve(&self, _: NodeRef, _: u64, _: usize, _: usize) -> CacheResult<Vec<FileExtent>> {
        Err(CacheError::NotFound)
    }
}

// ============================================================================
// Futex and accounting
// ============================================================================

/// Condition-variable futex
#[derive(Default)]
pub struct StdFutex {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Futex for StdFutex {
    fn wait(&self, word: &core::sync::atomic::AtomicU32, expected: u32) {
        let mut guard = self.lock.lock().unwrap();
        while word.load(Ordering::SeqCst) == expected {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    fn wake_all(&self, _word: &core::sync::atomic::AtomicU32) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_all();
    }
}

/// Accounting notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountingEvent {
    Opened(NodeInfo),
    Closed(NodeInfo, CacheStatsSnapshot),
}

#[derive(Default)]
pub struct RecordingAccounting {
    events: Mutex<Vec<AccountingEvent>>,
}

impl RecordingAccounting {
    pub fn events(&self) -> Vec<AccountingEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl CacheAccounting for RecordingAccounting {
    fn node_opened(&self, info: &NodeInfo) {
        self.events
            .lock()
            .unwrap()
            .push(AccountingEvent::Opened(*info));
    }

    fn node_closed(&self, info: &NodeInfo, stats: &CacheStatsSnapshot) {
        self.events
            .lock()
            .unwrap()
            .push(AccountingEvent::Closed(*info, *stats));
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Descriptor the harness attaches its device under
pub const TEST_FD: DeviceFd = 3;

/// Node used by the harness
pub const TEST_NODE: NodeRef = NodeRef::new(1, 42);

/// A manager wired to in-memory fakes, plus one open cache
pub struct Harness {
    pub allocator: Arc<HeapAllocator>,
    pub device: Arc<MemoryDevice>,
    pub accounting: Arc<RecordingAccounting>,
    pub manager: FileCacheManager,
    pub cache: Arc<FileCache>,
}

impl Harness {
    /// File of `file_size` bytes stored linearly on a patterned device of
    /// the same length
    pub fn new(file_size: u64, config: FileCacheConfig) -> Self {
        Self::build(
            Arc::new(MemoryDevice::patterned(file_size as usize)),
            Arc::new(LinearExtents { base: 0 }),
            file_size,
            config,
        )
    }

    pub fn build(
        device: Arc<MemoryDevice>,
        extents: Arc<dyn ExtentMap>,
        file_size: u64,
        config: FileCacheConfig,
    ) -> Self {
        let allocator = Arc::new(HeapAllocator::new());
        let accounting = Arc::new(RecordingAccounting::default());
        let table = Arc::new(MemoryDeviceTable::new());
        table.attach(TEST_FD, device.clone());
        allocator.watch(device.in_flight());

        let manager = FileCacheManager::new(table, extents, allocator.clone())
            .with_futex(Arc::new(StdFutex::default()))
            .with_accounting(accounting.clone())
            .with_config(config);
        let cache = manager
            .create(TEST_NODE.device, TEST_NODE.node, file_size, TEST_FD)
            .unwrap();

        Self {
            allocator,
            device,
            accounting,
            manager,
            cache,
        }
    }

    /// Read `len` bytes at `offset`, returning the bytes actually read
    pub fn read(&self, offset: u64, len: usize) -> Vec<u8> {
        let mut buf = alloc::vec![0u8; len];
        let n = self.cache.read(offset, &mut buf).unwrap();
        buf.truncate(n);
        buf
    }
}
