//! Cache accounting hooks.
//!
//! Lets the memory manager track which files hold cache pages. The
//! notifications carry no obligations; the cache works the same whether
//! anyone listens or not.

use crate::cache::CacheStatsSnapshot;
use crate::core::types::NodeRef;

/// What the accounting collaborator learns about a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    /// The node
    pub node: NodeRef,
    /// Logical size at the time of the notification
    pub size: u64,
    /// Pages resident in its cache
    pub resident_pages: usize,
}

/// Receiver of open/close notifications
pub trait CacheAccounting: Send + Sync {
    /// A node backed by a cache was opened
    fn node_opened(&self, info: &NodeInfo);

    /// A node backed by a cache was closed
    fn node_closed(&self, info: &NodeInfo, stats: &CacheStatsSnapshot);
}

/// Accounting that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAccounting;

impl CacheAccounting for NoopAccounting {
    fn node_opened(&self, _info: &NodeInfo) {}

    fn node_closed(&self, _info: &NodeInfo, _stats: &CacheStatsSnapshot) {}
}
