//! The managed heap: pools + collector + notifications behind `MemoryManager`.
//!
//! Allocation path:
//! 1. reserve bytes on the allocation pool (lock-free);
//! 2. if that fails, run a collection that clears soft referents oldest-first
//!    until the request fits, then evaluate the collection threshold;
//! 3. retry once; a second failure is [`Exhausted`].

use std::sync::Arc;

use heapwatch_core::config::{HarnessConfig, PoolSpec};
use heapwatch_core::error::{Error as CoreError, Exhausted, Result as CoreResult};
use heapwatch_core::manager::{MemoryManager, NotificationListener};
use heapwatch_core::notification::{
    COLLECTION_COMPLETED, MEMORY_COLLECTION_THRESHOLD_EXCEEDED, MEMORY_THRESHOLD_EXCEEDED,
};
use heapwatch_core::usage::{MemoryUsage, PoolInfo, PoolType};

use crate::error::Result;
use crate::guard::Block;
use crate::notify::Notifier;
use crate::pool::{Crossing, PoolState};
use crate::soft::{SoftHandle, SoftTable};
use crate::tracking::PeakTracker;

/// Concrete memory manager used by the harness.
///
/// Not `Clone`; share it behind an `Arc`.
pub struct ManagedHeap {
    pools: Vec<Arc<PoolState>>,
    target: Arc<PoolState>,
    soft: SoftTable,
    peak: PeakTracker,
    notifier: Notifier,
}

impl ManagedHeap {
    /// Build a heap from pool specs; `allocation_pool` must name a bounded heap pool.
    pub fn new(specs: &[PoolSpec], allocation_pool: &str) -> Result<Self> {
        let pools: Vec<Arc<PoolState>> = specs
            .iter()
            .map(|s| Arc::new(PoolState::new(s)))
            .collect();
        let target = pools
            .iter()
            .find(|p| p.name() == allocation_pool)
            .cloned()
            .ok_or_else(|| CoreError::UnknownPool(allocation_pool.to_string()))?;
        if target.pool_type() != PoolType::Heap || target.capacity().is_none() {
            return Err(CoreError::Config(format!(
                "allocation pool '{}' must be a bounded heap pool",
                allocation_pool
            ))
            .into());
        }

        Ok(Self {
            pools,
            target,
            soft: SoftTable::new(),
            peak: PeakTracker::new(),
            notifier: Notifier::start()?,
        })
    }

    pub fn from_config(cfg: &HarnessConfig) -> Result<Self> {
        Self::new(&cfg.pool_specs(), &cfg.allocation_pool)
    }

    /// Highest heap usage observed by an allocation.
    pub fn peak_bytes(&self) -> u64 {
        self.peak.peak()
    }

    /// Referents currently held alive by the collector.
    pub fn soft_referents(&self) -> usize {
        self.soft.len()
    }

    /// Run a full collection, clearing every soft referent.
    pub fn collect(&self) -> usize {
        let cleared = self.soft.clear_all();
        self.finish_collection(cleared);
        cleared
    }

    /// Clear soft referents until `needed` more bytes fit in the allocation pool.
    fn collect_for(&self, needed: u64) -> usize {
        let target = &self.target;
        let cap = target.capacity().unwrap_or(u64::MAX);
        let cleared = self
            .soft
            .clear_until(|| target.used().saturating_add(needed) <= cap);
        self.finish_collection(cleared);
        cleared
    }

    fn finish_collection(&self, cleared: usize) {
        let usage = self.target.usage();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pool = self.target.name(),
            cleared,
            used = usage.used,
            "collection finished"
        );
        self.notifier
            .emit(COLLECTION_COMPLETED, self.target.name(), usage, cleared as u64);

        for pool in &self.pools {
            if let Some(Crossing { usage, count }) = pool.check_after_collection() {
                #[cfg(feature = "tracing")]
                tracing::trace!(pool = pool.name(), used = usage.used, count, "collection threshold crossed");
                self.notifier
                    .emit(MEMORY_COLLECTION_THRESHOLD_EXCEEDED, pool.name(), usage, count);
            }
        }
    }

    fn reserve(&self, bytes: u64) -> bool {
        match self.target.try_acquire(bytes) {
            None => false,
            Some(crossing) => {
                if let Some(Crossing { usage, count }) = crossing {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(pool = self.target.name(), used = usage.used, count, "usage threshold crossed");
                    self.notifier
                        .emit(MEMORY_THRESHOLD_EXCEEDED, self.target.name(), usage, count);
                }
                self.peak.record_used(self.heap_usage().used);
                true
            }
        }
    }

    fn pool(&self, name: &str) -> CoreResult<&Arc<PoolState>> {
        self.pools
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| CoreError::UnknownPool(name.to_string()))
    }

    fn exhausted(&self, requested: usize) -> Exhausted {
        Exhausted {
            pool: self.target.name().to_string(),
            requested,
            capacity: self.target.capacity().unwrap_or(u64::MAX),
            used: self.target.used(),
        }
    }
}

impl MemoryManager for ManagedHeap {
    type Block = Block;
    type Handle = SoftHandle;

    fn pools(&self) -> Vec<PoolInfo> {
        self.pools.iter().map(|p| p.info()).collect()
    }

    fn set_usage_threshold(&self, pool: &str, bytes: u64) -> CoreResult<()> {
        self.pool(pool)?.set_usage_threshold(bytes)
    }

    fn set_collection_usage_threshold(&self, pool: &str, bytes: u64) -> CoreResult<()> {
        self.pool(pool)?.set_collection_usage_threshold(bytes)
    }

    fn heap_usage(&self) -> MemoryUsage {
        self.pools
            .iter()
            .filter(|p| p.pool_type() == PoolType::Heap)
            .fold(MemoryUsage::new(0, Some(0)), |acc, p| acc.combine(p.usage()))
    }

    fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.notifier.add_listener(listener);
    }

    fn flush_notifications(&self) {
        self.notifier.flush();
    }

    fn allocate(&self, bytes: usize) -> std::result::Result<Block, Exhausted> {
        let wanted = bytes as u64;
        if !self.reserve(wanted) {
            self.collect_for(wanted);
            if !self.reserve(wanted) {
                return Err(self.exhausted(bytes));
            }
        }
        Block::materialise(Arc::clone(&self.target), bytes).ok_or_else(|| self.exhausted(bytes))
    }

    fn soften(&self, block: Block) -> SoftHandle {
        self.soft.insert(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use heapwatch_core::manager::Reclaimable;
    use heapwatch_core::notification::Notification;
    use std::time::Duration;

    const KIB: usize = 1024;

    fn heap(cap: u64) -> ManagedHeap {
        let specs = vec![
            PoolSpec::heap("eden", None).without_thresholds(),
            PoolSpec::heap("old-gen", Some(cap)),
            PoolSpec::non_heap("metaspace", None),
        ];
        ManagedHeap::new(&specs, "old-gen").unwrap()
    }

    #[test]
    fn rejects_unbounded_allocation_pool() {
        let specs = vec![PoolSpec::heap("eden", None)];
        assert!(ManagedHeap::new(&specs, "eden").is_err());
        assert!(ManagedHeap::new(&specs, "missing").is_err());
    }

    #[test]
    fn heap_usage_is_unbounded_when_any_heap_pool_is() {
        let h = heap(8 * KIB as u64);
        let _b = h.allocate(KIB).unwrap();
        let usage = h.heap_usage();
        assert_eq!(usage.used, KIB as u64);
        assert_eq!(usage.max, None);
        assert_eq!(h.peak_bytes(), KIB as u64);
    }

    #[test]
    fn default_layout_reports_bounded_heap_usage() {
        let cfg = HarnessConfig::default();
        let h = ManagedHeap::from_config(&cfg).unwrap();
        assert_eq!(
            h.heap_usage().max,
            Some(cfg.heap_capacity_bytes + cfg.heap_capacity_bytes / 4)
        );
    }

    #[test]
    fn flush_delivers_pending_threshold_notifications() {
        let h = heap(4 * KIB as u64);
        h.set_usage_threshold("old-gen", 2 * KIB as u64).unwrap();
        let (tx, rx) = unbounded::<Notification>();
        h.add_listener(Arc::new(move |n: &Notification| {
            let _ = tx.send(n.clone());
        }));

        let _held: Vec<_> = (0..3).map(|_| h.allocate(KIB).unwrap()).collect();
        h.flush_notifications();
        let seen: Vec<_> = rx.try_iter().map(|n| n.type_name).collect();
        assert_eq!(seen, vec![MEMORY_THRESHOLD_EXCEEDED.to_string()]);
    }

    #[test]
    fn strong_blocks_exhaust_the_pool() {
        let h = heap(4 * KIB as u64);
        let held: Vec<_> = (0..4).map(|_| h.allocate(KIB).unwrap()).collect();
        let err = h.allocate(KIB).unwrap_err();
        assert_eq!(err.pool, "old-gen");
        assert_eq!(err.requested, KIB);
        assert_eq!(err.used, 4 * KIB as u64);
        drop(held);
        assert!(h.allocate(KIB).is_ok());
    }

    #[test]
    fn soft_blocks_are_cleared_under_pressure() {
        let h = heap(4 * KIB as u64);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let b = h.allocate(KIB).unwrap();
                h.soften(b)
            })
            .collect();
        assert!(handles.iter().all(|s| s.is_live()));

        let _strong = h.allocate(2 * KIB).unwrap();
        let live = handles.iter().filter(|s| s.is_live()).count();
        assert_eq!(live, 2);
        // Oldest cleared first.
        assert!(!handles[0].is_live());
        assert!(!handles[1].is_live());
        assert_eq!(h.soft_referents(), 2);
    }

    #[test]
    fn emits_threshold_notifications() {
        let h = heap(10 * KIB as u64);
        h.set_usage_threshold("old-gen", 5 * KIB as u64).unwrap();
        h.set_collection_usage_threshold("old-gen", 5 * KIB as u64).unwrap();

        let (tx, rx) = unbounded::<Notification>();
        h.add_listener(Arc::new(move |n: &Notification| {
            let _ = tx.send(n.clone());
        }));

        let mut strong = Vec::new();
        for _ in 0..10 {
            strong.push(h.allocate(KIB).unwrap());
        }
        assert!(h.allocate(KIB).is_err());

        let mut seen = Vec::new();
        while let Ok(n) = rx.recv_timeout(Duration::from_secs(5)) {
            seen.push(n.type_name.clone());
            if n.type_name == MEMORY_COLLECTION_THRESHOLD_EXCEEDED {
                break;
            }
        }
        assert_eq!(
            seen,
            vec![
                MEMORY_THRESHOLD_EXCEEDED.to_string(),
                COLLECTION_COMPLETED.to_string(),
                MEMORY_COLLECTION_THRESHOLD_EXCEEDED.to_string(),
            ]
        );
    }

    #[test]
    fn explicit_collect_clears_everything() {
        let h = heap(8 * KIB as u64);
        let s = {
            let b = h.allocate(KIB).unwrap();
            h.soften(b)
        };
        assert_eq!(h.collect(), 1);
        assert!(s.get().is_none());
        assert_eq!(h.heap_usage().used, 0);
    }
}
