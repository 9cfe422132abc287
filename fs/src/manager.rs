//! # Cache Manager
//!
//! Owns the collaborators shared by every file cache and keeps a registry
//! of live caches keyed by node.
//!
//! The registry holds weak references only: a cache lives exactly as long
//! as its users hold an `Arc<FileCache>`, and dropping the last one gives
//! the device cookie back.

use alloc::sync::{Arc, Weak};
use core::fmt;

use hashbrown::HashMap;
use spin::Mutex;

use crate::accounting::{CacheAccounting, NoopAccounting};
use crate::cache::FileCache;
use crate::core::config::FileCacheConfig;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{DeviceFd, DeviceId, NodeId, NodeRef};
use crate::io::device::DeviceTable;
use crate::io::extent::ExtentMap;
use crate::vm::{Futex, PageAllocator, SpinFutex, VmCache};

/// Creates, finds and destroys file caches
pub struct FileCacheManager {
    devices: Arc<dyn DeviceTable>,
    extent_map: Arc<dyn ExtentMap>,
    allocator: Arc<dyn PageAllocator>,
    futex: Arc<dyn Futex>,
    accounting: Arc<dyn CacheAccounting>,
    config: FileCacheConfig,
    caches: Mutex<HashMap<NodeRef, Weak<FileCache>>>,
}

impl FileCacheManager {
    /// Create a manager with default configuration, a spinning futex and
    /// no accounting
    pub fn new(
        devices: Arc<dyn DeviceTable>,
        extent_map: Arc<dyn ExtentMap>,
        allocator: Arc<dyn PageAllocator>,
    ) -> Self {
        Self {
            devices,
            extent_map,
            allocator,
            futex: Arc::new(SpinFutex),
            accounting: Arc::new(NoopAccounting),
            config: FileCacheConfig::new(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Use `futex` for busy-page waits
    pub fn with_futex(mut self, futex: Arc<dyn Futex>) -> Self {
        self.futex = futex;
        self
    }

    /// Report open/close to `accounting`
    pub fn with_accounting(mut self, accounting: Arc<dyn CacheAccounting>) -> Self {
        self.accounting = accounting;
        self
    }

    /// Configuration for caches created from now on
    pub fn with_config(mut self, config: FileCacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &FileCacheConfig {
        &self.config
    }

    /// Create the cache of a node of `size` bytes whose filesystem reaches
    /// its device through `device_fd`.
    ///
    /// Fails with `AlreadyExists` while another cache of the same node is
    /// alive.
    pub fn create(
        &self,
        device_id: DeviceId,
        node_id: NodeId,
        size: u64,
        device_fd: DeviceFd,
    ) -> CacheResult<Arc<FileCache>> {
        self.config.validate()?;
        let node = NodeRef::new(device_id, node_id);

        let mut caches = self.caches.lock();
        if caches.get(&node).is_some_and(|weak| weak.strong_count() > 0) {
            return Err(CacheError::AlreadyExists);
        }

        let device = self.devices.open(device_fd)?;
        let vm = Arc::new(VmCache::new(size, self.allocator.clone(), self.futex.clone()));
        let cache = Arc::new(FileCache::new(
            node,
            vm,
            device,
            self.extent_map.clone(),
            self.accounting.clone(),
            self.config,
        ));
        caches.insert(node, Arc::downgrade(&cache));

        log::debug!("filecache {}: created, size {:#x}, fd {}", node, size, device_fd);
        Ok(cache)
    }

    /// Unregister a cache and drop this handle to it.
    ///
    /// The cache itself goes away once its other users are done with it.
    pub fn destroy(&self, cache: Arc<FileCache>) {
        let node = cache.node();
        let mut caches = self.caches.lock();
        let registered = caches
            .get(&node)
            .is_some_and(|weak| core::ptr::eq(weak.as_ptr(), Arc::as_ptr(&cache)));
        if registered {
            caches.remove(&node);
        }
        drop(caches);

        log::debug!(
            "filecache {}: destroyed, {} other users",
            node,
            Arc::strong_count(&cache) - 1
        );
    }

    /// Live cache of a node
    pub fn lookup(&self, device_id: DeviceId, node_id: NodeId) -> Option<Arc<FileCache>> {
        let node = NodeRef::new(device_id, node_id);
        let mut caches = self.caches.lock();
        let cache = caches.get(&node).and_then(Weak::upgrade);
        if cache.is_none() {
            caches.remove(&node);
        }
        cache
    }

    /// Warm the first `prefetch_size` bytes of a node's cache.
    ///
    /// Nodes without a live cache are ignored. Returns the pages brought in.
    pub fn prefetch(&self, device_id: DeviceId, node_id: NodeId) -> usize {
        match self.lookup(device_id, node_id) {
            Some(cache) => cache.prefetch_range(0, self.config.prefetch_size as u64),
            None => 0,
        }
    }

    /// Number of registered caches that are still alive
    pub fn live_caches(&self) -> usize {
        self.caches
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl fmt::Debug for FileCacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCacheManager")
            .field("config", &self.config)
            .field("caches", &self.caches.lock().len())
            .finish_non_exhaustive()
    }
}
