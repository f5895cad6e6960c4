//! Per-pool accounting and threshold state.
//!
//! Usage only moves through `try_acquire`/`release`; the pool itself never
//! allocates. Threshold crossings are detected from the before/after values
//! of the accounting CAS, so they are edge-triggered without extra locking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use heapwatch_core::config::PoolSpec;
use heapwatch_core::error::{Error, Result};
use heapwatch_core::usage::{MemoryUsage, PoolInfo, PoolType};

/// Sentinel for "no threshold installed".
const UNSET: u64 = 0;

pub struct PoolState {
    name: String,
    pool_type: PoolType,
    capacity: Option<u64>,
    used: AtomicU64,
    usage_threshold_supported: bool,
    collection_usage_threshold_supported: bool,
    usage_threshold: AtomicU64,
    collection_threshold: AtomicU64,
    usage_crossings: AtomicU64,
    collection_crossings: AtomicU64,
    /// Cleared while post-collection usage stays at or above the threshold.
    collection_armed: AtomicBool,
}

/// A threshold crossing observed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub usage: MemoryUsage,
    pub count: u64,
}

impl PoolState {
    pub fn new(spec: &PoolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            pool_type: spec.pool_type,
            capacity: spec.capacity_bytes,
            used: AtomicU64::new(0),
            usage_threshold_supported: spec.usage_threshold_supported,
            collection_usage_threshold_supported: spec.collection_usage_threshold_supported,
            usage_threshold: AtomicU64::new(UNSET),
            collection_threshold: AtomicU64::new(UNSET),
            usage_crossings: AtomicU64::new(0),
            collection_crossings: AtomicU64::new(0),
            collection_armed: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool_type(&self) -> PoolType {
        self.pool_type
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    /// Current usage (advisory).
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage::new(self.used(), self.capacity)
    }

    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            name: self.name.clone(),
            pool_type: self.pool_type,
            usage: self.usage(),
            usage_threshold_supported: self.usage_threshold_supported,
            collection_usage_threshold_supported: self.collection_usage_threshold_supported,
            usage_threshold: load_threshold(&self.usage_threshold),
            collection_usage_threshold: load_threshold(&self.collection_threshold),
        }
    }

    /// Reserve `bytes` against the capacity.
    ///
    /// Returns `None` if the request does not fit, otherwise whether this
    /// acquire moved usage across the usage threshold.
    pub fn try_acquire(&self, bytes: u64) -> Option<Option<Crossing>> {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if let Some(cap) = self.capacity {
                if next > cap {
                    return None;
                }
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let threshold = self.usage_threshold.load(Ordering::Acquire);
                if threshold != UNSET && cur < threshold && next >= threshold {
                    let count = self.usage_crossings.fetch_add(1, Ordering::AcqRel) + 1;
                    return Some(Some(Crossing {
                        usage: MemoryUsage::new(next, self.capacity),
                        count,
                    }));
                }
                return Some(None);
            }
        }
    }

    pub fn release(&self, bytes: u64) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Evaluate usage right after a collection against the collection threshold.
    pub fn check_after_collection(&self) -> Option<Crossing> {
        let threshold = self.collection_threshold.load(Ordering::Acquire);
        if threshold == UNSET {
            return None;
        }
        let usage = self.usage();
        if usage.used < threshold {
            self.collection_armed.store(true, Ordering::Release);
            return None;
        }
        if self.collection_armed.swap(false, Ordering::AcqRel) {
            let count = self.collection_crossings.fetch_add(1, Ordering::AcqRel) + 1;
            Some(Crossing { usage, count })
        } else {
            None
        }
    }

    pub fn set_usage_threshold(&self, bytes: u64) -> Result<()> {
        if !self.usage_threshold_supported {
            return Err(Error::ThresholdUnsupported {
                pool: self.name.clone(),
                what: "usage threshold",
            });
        }
        self.check_threshold(bytes)?;
        self.usage_threshold.store(bytes, Ordering::Release);
        Ok(())
    }

    pub fn set_collection_usage_threshold(&self, bytes: u64) -> Result<()> {
        if !self.collection_usage_threshold_supported {
            return Err(Error::ThresholdUnsupported {
                pool: self.name.clone(),
                what: "collection usage threshold",
            });
        }
        self.check_threshold(bytes)?;
        self.collection_threshold.store(bytes, Ordering::Release);
        self.collection_armed.store(true, Ordering::Release);
        Ok(())
    }

    fn check_threshold(&self, bytes: u64) -> Result<()> {
        let within = match self.capacity {
            Some(cap) => bytes < cap,
            None => true,
        };
        if bytes == 0 || !within {
            return Err(Error::InvalidThreshold {
                pool: self.name.clone(),
                threshold: bytes,
                max: self.capacity,
            });
        }
        Ok(())
    }
}

fn load_threshold(slot: &AtomicU64) -> Option<u64> {
    match slot.load(Ordering::Acquire) {
        UNSET => None,
        v => Some(v),
    }
}
