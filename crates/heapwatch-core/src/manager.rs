//! Abstract memory-manager interfaces.
//!
//! The concrete managed heap lives in `heapwatch-mem`. We keep only traits here
//! so the monitoring engine can be driven by any manager, including test doubles.

use std::sync::Arc;

use crate::error::{Exhausted, Result};
use crate::notification::Notification;
use crate::usage::{MemoryUsage, PoolInfo};

/// A handle whose referent may be cleared by the manager at any time, without
/// notifying the holder.
///
/// Cloning a handle never extends the referent's lifetime.
pub trait Reclaimable: Clone + Send + Sync {
    type Referent;

    /// Dereference the handle, or `None` if the referent has been cleared.
    fn get(&self) -> Option<Self::Referent>;

    /// Whether the referent is still reachable.
    fn is_live(&self) -> bool {
        self.get().is_some()
    }
}

/// Receives notifications from a [`MemoryManager`].
///
/// Called on a manager-owned delivery thread; must not block indefinitely.
pub trait NotificationListener: Send + Sync {
    fn handle_notification(&self, notification: &Notification);
}

impl<F> NotificationListener for F
where
    F: Fn(&Notification) + Send + Sync,
{
    fn handle_notification(&self, notification: &Notification) {
        self(notification)
    }
}

/// The runtime memory manager observed by the harness.
///
/// Implemented by `heapwatch-mem`. The harness configures thresholds once,
/// subscribes a listener, and then allocates until [`MemoryManager::allocate`]
/// reports [`Exhausted`].
pub trait MemoryManager: Send + Sync + 'static {
    /// Strongly owned block of memory.
    type Block: Send + 'static;
    /// Reclaimable handle produced by [`MemoryManager::soften`].
    type Handle: Reclaimable + 'static;

    /// Enumerate all pools, heap and non-heap.
    fn pools(&self) -> Vec<PoolInfo>;

    fn set_usage_threshold(&self, pool: &str, bytes: u64) -> Result<()>;

    fn set_collection_usage_threshold(&self, pool: &str, bytes: u64) -> Result<()>;

    /// Aggregate usage over all heap pools.
    fn heap_usage(&self) -> MemoryUsage;

    /// Subscribe to the notification stream.
    fn add_listener(&self, listener: Arc<dyn NotificationListener>);

    /// Block until notifications raised so far have reached every listener.
    ///
    /// Managers that deliver on the raising thread have nothing to wait for.
    fn flush_notifications(&self) {}

    /// Allocate `bytes`. Fails only when no memory can be made available.
    fn allocate(&self, bytes: usize) -> std::result::Result<Self::Block, Exhausted>;

    /// Give up the strong ownership of `block`; the manager may clear it
    /// whenever it needs the memory.
    fn soften(&self, block: Self::Block) -> Self::Handle;
}

// NOTE: Do *not* add default impls for the threshold mutators; a manager that
// cannot honour them must say so with `Error::ThresholdUnsupported`.
