//! # Cache Configuration
//!
//! Tunables for the file cache and the key/value provider they can be
//! loaded from.
//!
//! ## Keys
//!
//! | Key | Type | Default |
//! |-----|------|---------|
//! | `filecache.prefetch_size` | uint | 65536 |
//! | `filecache.max_chunk_pages` | uint | 32 |
//! | `filecache.max_file_extents` | uint | 16 |
//! | `filecache.write_through` | bool | false |

use alloc::collections::BTreeMap;
use alloc::string::String;

use static_assertions::const_assert;

use super::error::{CacheError, CacheResult};
use super::types::PAGE_SIZE;
use crate::io::iovec::MAX_IO_VECS;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default amount of a file warmed by prefetch
pub const DEFAULT_PREFETCH_SIZE: usize = 64 * 1024;

/// Default (and maximum) number of pages one populate/flush call may cover
pub const MAX_READ_PAGES: usize = 32;

/// Default number of extents resolved per translation
pub const MAX_FILE_EXTENTS: usize = 16;

const_assert!(DEFAULT_PREFETCH_SIZE % PAGE_SIZE == 0);
const_assert!(MAX_READ_PAGES <= MAX_IO_VECS);

// =============================================================================
// CONFIG VALUES
// =============================================================================

/// Configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// Boolean
    Bool(bool),
    /// Unsigned integer
    Uint(u64),
    /// String
    String(String),
}

impl ConfigValue {
    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as uint
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ConfigValue::Uint(u) => Some(*u),
            _ => None,
        }
    }
}

/// Configuration provider trait
pub trait ConfigProvider: Send + Sync {
    /// Get a configuration value
    fn get(&self, key: &str) -> Option<ConfigValue>;
}

/// Simple in-memory config provider
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl MemoryConfig {
    /// Create empty config
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Set a value
    pub fn set(&mut self, key: impl Into<String>, value: ConfigValue) {
        self.values.insert(key.into(), value);
    }

    /// Set bool
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, ConfigValue::Bool(value));
    }

    /// Set uint
    pub fn set_uint(&mut self, key: impl Into<String>, value: u64) {
        self.set(key, ConfigValue::Uint(value));
    }
}

impl ConfigProvider for MemoryConfig {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }
}

// =============================================================================
// FILE CACHE CONFIG
// =============================================================================

/// File cache tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileCacheConfig {
    /// Bytes from the start of a file warmed by `prefetch`
    pub prefetch_size: usize,
    /// Upper bound on pages reserved by a single populate/flush call
    pub max_chunk_pages: usize,
    /// Upper bound on extents resolved per translation
    pub max_file_extents: usize,
    /// Push written chunks to the device before completing the write
    pub write_through: bool,
}

impl FileCacheConfig {
    /// Key prefix used by [`FileCacheConfig::from_provider`]
    pub const KEY_PREFIX: &'static str = "filecache.";

    /// Default configuration
    pub const fn new() -> Self {
        Self {
            prefetch_size: DEFAULT_PREFETCH_SIZE,
            max_chunk_pages: MAX_READ_PAGES,
            max_file_extents: MAX_FILE_EXTENTS,
            write_through: false,
        }
    }

    /// Set prefetch size
    pub const fn with_prefetch_size(mut self, bytes: usize) -> Self {
        self.prefetch_size = bytes;
        self
    }

    /// Set the per-call page bound
    pub const fn with_max_chunk_pages(mut self, pages: usize) -> Self {
        self.max_chunk_pages = pages;
        self
    }

    /// Set the per-translation extent bound
    pub const fn with_max_file_extents(mut self, extents: usize) -> Self {
        self.max_file_extents = extents;
        self
    }

    /// Enable or disable write-through
    pub const fn with_write_through(mut self, enabled: bool) -> Self {
        self.write_through = enabled;
        self
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> CacheResult<()> {
        crate::cache_ensure!(
            self.max_chunk_pages > 0 && self.max_chunk_pages <= MAX_IO_VECS,
            CacheError::InvalidArgument
        );
        crate::cache_ensure!(self.max_file_extents > 0, CacheError::InvalidArgument);
        crate::cache_ensure!(
            self.prefetch_size % PAGE_SIZE == 0,
            CacheError::InvalidArgument
        );
        Ok(())
    }

    /// Load from a provider, falling back to defaults for missing keys.
    ///
    /// A key holding a value of the wrong type is rejected rather than
    /// silently ignored.
    pub fn from_provider(provider: &dyn ConfigProvider) -> CacheResult<Self> {
        let defaults = Self::new();
        let config = Self {
            prefetch_size: read_uint(provider, "prefetch_size", defaults.prefetch_size)?,
            max_chunk_pages: read_uint(provider, "max_chunk_pages", defaults.max_chunk_pages)?,
            max_file_extents: read_uint(
                provider,
                "max_file_extents",
                defaults.max_file_extents,
            )?,
            write_through: read_bool(provider, "write_through", defaults.write_through)?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn full_key(name: &str) -> String {
    let mut key = String::from(FileCacheConfig::KEY_PREFIX);
    key.push_str(name);
    key
}

fn read_uint(provider: &dyn ConfigProvider, name: &str, default: usize) -> CacheResult<usize> {
    match provider.get(&full_key(name)) {
        None => Ok(default),
        Some(value) => value
            .as_uint()
            .and_then(|v| usize::try_from(v).ok())
            .ok_or(CacheError::InvalidArgument),
    }
}

fn read_bool(provider: &dyn ConfigProvider, name: &str, default: bool) -> CacheResult<bool> {
    match provider.get(&full_key(name)) {
        None => Ok(default),
        Some(value) => value.as_bool().ok_or(CacheError::InvalidArgument),
    }
}
