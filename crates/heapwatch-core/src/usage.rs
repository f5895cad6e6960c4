//! Pool and usage descriptors reported by a memory manager.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIB: u64 = 1024 * 1024;

/// Whether a pool belongs to the collected heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolType {
    Heap,
    NonHeap,
}

/// Point-in-time usage of a pool (or of the whole heap).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: u64,
    /// `None` means the pool is unbounded.
    pub max: Option<u64>,
}

impl MemoryUsage {
    pub const fn new(used: u64, max: Option<u64>) -> Self {
        Self { used, max }
    }

    /// Sum two usages. The result is unbounded if either side is.
    pub fn combine(self, other: MemoryUsage) -> MemoryUsage {
        let max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.saturating_add(b)),
            _ => None,
        };
        MemoryUsage {
            used: self.used.saturating_add(other.used),
            max,
        }
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(
                f,
                "used = {}({}M) max = {}({}M)",
                self.used,
                self.used / MIB,
                max,
                max / MIB
            ),
            None => write!(f, "used = {}({}M) max = unbounded", self.used, self.used / MIB),
        }
    }
}

/// Description of one memory pool as enumerated by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub name: String,
    pub pool_type: PoolType,
    pub usage: MemoryUsage,
    pub usage_threshold_supported: bool,
    pub collection_usage_threshold_supported: bool,
    /// Currently installed thresholds, if any.
    pub usage_threshold: Option<u64>,
    pub collection_usage_threshold: Option<u64>,
}

impl PoolInfo {
    /// True when both threshold kinds can be installed on this pool.
    pub fn supports_thresholds(&self) -> bool {
        self.usage_threshold_supported && self.collection_usage_threshold_supported
    }
}
