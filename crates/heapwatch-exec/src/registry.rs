//! Threshold installation on the manager's heap pools.
//!
//! For every heap pool that supports both threshold kinds the installed value
//! is `min(fraction * max, max - headroom)`, used for both the usage and the
//! collection-usage threshold. Pools where that is not a positive value
//! below `max` are left unmonitored.

use serde::{Deserialize, Serialize};

use heapwatch_core::config::HarnessConfig;
use heapwatch_core::error::Result;
use heapwatch_core::manager::MemoryManager;
use heapwatch_core::usage::{PoolInfo, PoolType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledThreshold {
    pub pool: String,
    pub threshold: u64,
    pub max: u64,
    /// Pool usage when the threshold was installed.
    pub used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPool {
    pub pool: String,
    /// `None` for unbounded pools.
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub installed: Vec<InstalledThreshold>,
    pub skipped: Vec<SkippedPool>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolRegistry {
    headroom: u64,
    fraction: f64,
}

impl PoolRegistry {
    pub fn new(headroom: u64, fraction: f64) -> Self {
        Self { headroom, fraction }
    }

    pub fn from_config(cfg: &HarnessConfig) -> Self {
        Self::new(cfg.headroom_bytes, cfg.threshold_fraction)
    }

    /// Threshold for a pool of capacity `max`, or `None` if it would be `<= 0`
    /// (capacity smaller than the headroom) or would not sit below `max`.
    pub fn compute_threshold(&self, max: u64) -> Option<u64> {
        let scaled = (max as f64 * self.fraction).floor() as i128;
        let below_headroom = max as i128 - self.headroom as i128;
        let threshold = scaled.min(below_headroom);
        if threshold > 0 && threshold < max as i128 {
            Some(threshold as u64)
        } else {
            None
        }
    }

    fn eligible(pool: &PoolInfo) -> bool {
        pool.pool_type == PoolType::Heap && pool.supports_thresholds()
    }

    /// Install thresholds on every eligible pool. Call once per manager.
    pub fn register<M: MemoryManager + ?Sized>(&self, manager: &M) -> Result<Registration> {
        let mut registration = Registration::default();
        for pool in manager.pools().iter().filter(|p| Self::eligible(p)) {
            let threshold = pool.usage.max.and_then(|max| self.compute_threshold(max));
            match (threshold, pool.usage.max) {
                (Some(threshold), Some(max)) => {
                    manager.set_usage_threshold(&pool.name, threshold)?;
                    manager.set_collection_usage_threshold(&pool.name, threshold)?;
                    tracing::info!(
                        pool = %pool.name,
                        threshold,
                        used = pool.usage.used,
                        max,
                        "installed memory thresholds"
                    );
                    registration.installed.push(InstalledThreshold {
                        pool: pool.name.clone(),
                        threshold,
                        max,
                        used: pool.usage.used,
                    });
                }
                _ => {
                    tracing::info!(
                        pool = %pool.name,
                        max = ?pool.usage.max,
                        headroom = self.headroom,
                        "pool too small or unbounded; left unmonitored"
                    );
                    registration.skipped.push(SkippedPool {
                        pool: pool.name.clone(),
                        max: pool.usage.max,
                    });
                }
            }
        }
        Ok(registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::tests::FlagHandle;
    use heapwatch_core::error::{Error, Exhausted};
    use heapwatch_core::manager::NotificationListener;
    use heapwatch_core::usage::{MemoryUsage, MIB};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Manager that only records threshold mutations.
    #[derive(Default)]
    struct RecordingManager {
        pools: Vec<PoolInfo>,
        calls: Mutex<Vec<(&'static str, String, u64)>>,
    }

    impl MemoryManager for RecordingManager {
        type Block = ();
        type Handle = FlagHandle;

        fn pools(&self) -> Vec<PoolInfo> {
            self.pools.clone()
        }
        fn set_usage_threshold(&self, pool: &str, bytes: u64) -> Result<()> {
            self.calls.lock().push(("usage", pool.to_string(), bytes));
            Ok(())
        }
        fn set_collection_usage_threshold(&self, pool: &str, bytes: u64) -> Result<()> {
            if pool == "broken" {
                return Err(Error::UnknownPool(pool.to_string()));
            }
            self.calls.lock().push(("collection", pool.to_string(), bytes));
            Ok(())
        }
        fn heap_usage(&self) -> MemoryUsage {
            MemoryUsage::default()
        }
        fn add_listener(&self, _: Arc<dyn NotificationListener>) {}
        fn allocate(&self, _: usize) -> std::result::Result<(), Exhausted> {
            Ok(())
        }
        fn soften(&self, _: ()) -> FlagHandle {
            FlagHandle::live()
        }
    }

    fn pool(name: &str, pool_type: PoolType, used: u64, max: Option<u64>, both: bool) -> PoolInfo {
        PoolInfo {
            name: name.to_string(),
            pool_type,
            usage: MemoryUsage::new(used, max),
            usage_threshold_supported: true,
            collection_usage_threshold_supported: both,
            usage_threshold: None,
            collection_usage_threshold: None,
        }
    }

    fn registry() -> PoolRegistry {
        PoolRegistry::new(5 * MIB, 0.95)
    }

    #[test]
    fn hundred_mib_pool_gets_ninety_five() {
        assert_eq!(registry().compute_threshold(100 * MIB), Some(95 * MIB));
    }

    #[test]
    fn pool_smaller_than_headroom_is_skipped() {
        assert_eq!(registry().compute_threshold(4 * MIB), None);
        assert_eq!(registry().compute_threshold(5 * MIB), None);
        assert_eq!(registry().compute_threshold(0), None);
    }

    #[test]
    fn headroom_dominates_below_one_hundred_mib() {
        assert_eq!(registry().compute_threshold(50 * MIB), Some(45 * MIB));
        // 0.95 * 1 GiB leaves more than the headroom free.
        assert_eq!(registry().compute_threshold(1024 * MIB), Some(1_020_054_732));
    }

    #[test]
    fn installs_both_thresholds_on_eligible_heap_pools() {
        let manager = RecordingManager {
            pools: vec![
                pool("old-gen", PoolType::Heap, 10 * MIB, Some(100 * MIB), true),
                pool("tiny", PoolType::Heap, 0, Some(4 * MIB), true),
                pool("eden", PoolType::Heap, 0, None, true),
                pool("survivor", PoolType::Heap, 0, Some(100 * MIB), false),
                pool("metaspace", PoolType::NonHeap, 0, Some(100 * MIB), true),
            ],
            ..Default::default()
        };

        let reg = registry().register(&manager).unwrap();
        assert_eq!(
            reg.installed,
            vec![InstalledThreshold {
                pool: "old-gen".into(),
                threshold: 95 * MIB,
                max: 100 * MIB,
                used: 10 * MIB,
            }]
        );
        let skipped: Vec<_> = reg.skipped.iter().map(|s| s.pool.as_str()).collect();
        assert_eq!(skipped, vec!["tiny", "eden"]);

        let calls = manager.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("usage", "old-gen".to_string(), 95 * MIB),
                ("collection", "old-gen".to_string(), 95 * MIB),
            ]
        );
        for installed in &reg.installed {
            assert!(installed.threshold > 0 && installed.threshold < installed.max);
        }
    }

    #[test]
    fn mutator_failure_propagates() {
        let manager = RecordingManager {
            pools: vec![pool("broken", PoolType::Heap, 0, Some(100 * MIB), true)],
            ..Default::default()
        };
        assert!(matches!(
            registry().register(&manager),
            Err(Error::UnknownPool(_))
        ));
    }
}
