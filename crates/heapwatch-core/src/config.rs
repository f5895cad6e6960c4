//! Harness configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::usage::{PoolType, MIB};

/// How snapshots are rendered by the console reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

/// Static description of one pool of the managed heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub pool_type: PoolType,
    /// `None` = unbounded.
    pub capacity_bytes: Option<u64>,
    pub usage_threshold_supported: bool,
    pub collection_usage_threshold_supported: bool,
}

impl PoolSpec {
    pub fn heap(name: impl Into<String>, capacity_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            pool_type: PoolType::Heap,
            capacity_bytes,
            usage_threshold_supported: true,
            collection_usage_threshold_supported: true,
        }
    }

    pub fn non_heap(name: impl Into<String>, capacity_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            pool_type: PoolType::NonHeap,
            capacity_bytes,
            usage_threshold_supported: true,
            collection_usage_threshold_supported: false,
        }
    }

    pub fn without_thresholds(mut self) -> Self {
        self.usage_threshold_supported = false;
        self.collection_usage_threshold_supported = false;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// How close to a pool's capacity the thresholds are placed.
    pub headroom_bytes: u64,

    /// Fraction of capacity used as the other upper bound of a threshold.
    pub threshold_fraction: f64,

    /// Size of every block the simulator allocates.
    pub block_size: usize,

    /// Allocations between periodic snapshots.
    pub report_interval: u64,

    /// Cooperative pause after each periodic snapshot, in milliseconds.
    pub pause_ms: u64,

    /// Seed for the retained/reclaimable coin. `None` draws from entropy.
    pub seed: Option<u64>,

    /// Capacity of the default allocation pool.
    pub heap_capacity_bytes: u64,

    pub report_format: ReportFormat,

    /// Pool layout. `None` uses [`HarnessConfig::default_pools`].
    #[serde(default)]
    pub pools: Option<Vec<PoolSpec>>,

    /// Heap pool that receives the simulator's allocations.
    pub allocation_pool: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            headroom_bytes: 5 * MIB,
            threshold_fraction: 0.95,
            block_size: MIB as usize,
            report_interval: 100,
            pause_ms: 500,
            seed: Some(0),
            heap_capacity_bytes: 256 * MIB,
            report_format: ReportFormat::Text,
            pools: None,
            allocation_pool: "old-gen".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `HEAPWATCH_HEADROOM_BYTES`: threshold headroom in bytes
    /// - `HEAPWATCH_THRESHOLD_FRACTION`: threshold fraction of capacity
    /// - `HEAPWATCH_BLOCK_SIZE`: allocation block size in bytes
    /// - `HEAPWATCH_REPORT_INTERVAL`: allocations between reports
    /// - `HEAPWATCH_PAUSE_MS`: pause after each report
    /// - `HEAPWATCH_SEED`: coin seed (`random` for entropy)
    /// - `HEAPWATCH_HEAP_CAPACITY_BYTES`: allocation pool capacity
    /// - `HEAPWATCH_REPORT_FORMAT`: `text` or `json`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`HarnessConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = parse_var::<u64>(&lookup, "HEAPWATCH_HEADROOM_BYTES") {
            cfg.headroom_bytes = v;
        }

        if let Some(v) = parse_var::<f64>(&lookup, "HEAPWATCH_THRESHOLD_FRACTION") {
            cfg.threshold_fraction = v;
        }

        if let Some(v) = parse_var::<usize>(&lookup, "HEAPWATCH_BLOCK_SIZE") {
            cfg.block_size = v;
        }

        if let Some(v) = parse_var::<u64>(&lookup, "HEAPWATCH_REPORT_INTERVAL") {
            cfg.report_interval = v;
        }

        if let Some(v) = parse_var::<u64>(&lookup, "HEAPWATCH_PAUSE_MS") {
            cfg.pause_ms = v;
        }

        if let Some(s) = lookup("HEAPWATCH_SEED") {
            if s.trim().eq_ignore_ascii_case("random") {
                cfg.seed = None;
            } else if let Ok(v) = s.trim().parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        if let Some(v) = parse_var::<u64>(&lookup, "HEAPWATCH_HEAP_CAPACITY_BYTES") {
            cfg.heap_capacity_bytes = v;
        }

        if let Some(f) = lookup("HEAPWATCH_REPORT_FORMAT").and_then(|s| ReportFormat::parse(&s)) {
            cfg.report_format = f;
        }

        cfg
    }

    /// Young/old/metaspace layout with the old generation as allocation target.
    ///
    /// Both heap pools are bounded so the aggregate heap usage has a known max.
    pub fn default_pools(&self) -> Vec<PoolSpec> {
        vec![
            PoolSpec::heap("eden", Some(self.heap_capacity_bytes / 4)).without_thresholds(),
            PoolSpec::heap("old-gen", Some(self.heap_capacity_bytes)),
            PoolSpec::non_heap("metaspace", None),
        ]
    }

    pub fn pool_specs(&self) -> Vec<PoolSpec> {
        self.pools.clone().unwrap_or_else(|| self.default_pools())
    }

    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pause_ms)
    }

    /// Reject settings the harness cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be > 0".into()));
        }
        if self.report_interval == 0 {
            return Err(Error::Config("report_interval must be > 0".into()));
        }
        if !(self.threshold_fraction > 0.0 && self.threshold_fraction <= 1.0) {
            return Err(Error::Config(format!(
                "threshold_fraction must be in (0, 1], got {}",
                self.threshold_fraction
            )));
        }

        let specs = self.pool_specs();
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(Error::Config(format!("duplicate pool '{}'", spec.name)));
            }
        }
        match specs.iter().find(|s| s.name == self.allocation_pool) {
            None => Err(Error::Config(format!(
                "allocation pool '{}' is not configured",
                self.allocation_pool
            ))),
            Some(s) if s.pool_type != PoolType::Heap => Err(Error::Config(format!(
                "allocation pool '{}' is not a heap pool",
                s.name
            ))),
            Some(s) if s.capacity_bytes.is_none() => Err(Error::Config(format!(
                "allocation pool '{}' must be bounded",
                s.name
            ))),
            Some(_) => Ok(()),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.headroom_bytes, 5 * MIB);
        assert_eq!(cfg.report_interval, 100);
        assert_eq!(cfg.pause_ms, 500);
        cfg.validate().expect("default config must validate");
    }

    #[test]
    fn default_heap_pools_are_bounded() {
        let cfg = HarnessConfig::default();
        let heap_max: Vec<_> = cfg
            .default_pools()
            .into_iter()
            .filter(|p| p.pool_type == PoolType::Heap)
            .map(|p| p.capacity_bytes)
            .collect();
        assert_eq!(heap_max, vec![Some(64 * MIB), Some(256 * MIB)]);
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        let cfg = HarnessConfig::from_lookup(lookup_from(&[
            ("HEAPWATCH_BLOCK_SIZE", "4096"),
            ("HEAPWATCH_PAUSE_MS", "not-a-number"),
            ("HEAPWATCH_SEED", "random"),
            ("HEAPWATCH_REPORT_FORMAT", "JSON"),
        ]));
        assert_eq!(cfg.block_size, 4096);
        assert_eq!(cfg.pause_ms, 500);
        assert_eq!(cfg.seed, None);
        assert_eq!(cfg.report_format, ReportFormat::Json);
    }

    #[test]
    fn validate_rejects_bad_allocation_pool() {
        let mut cfg = HarnessConfig::default();
        cfg.allocation_pool = "eden".into();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        cfg.allocation_pool = "metaspace".into();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        cfg.allocation_pool = "missing".into();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let cfg = HarnessConfig {
            block_size: 0,
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = HarnessConfig {
            threshold_fraction: 1.5,
            ..HarnessConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn serde_round_trip_keeps_custom_pools() {
        let cfg = HarnessConfig {
            pools: Some(vec![PoolSpec::heap("tenured", Some(64 * MIB))]),
            allocation_pool: "tenured".into(),
            ..HarnessConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: HarnessConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pool_specs(), cfg.pool_specs());
        back.validate().unwrap();
    }
}
