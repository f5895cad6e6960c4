#![forbid(unsafe_code)]
//! heapwatch-exec: the threshold-monitoring and pressure-simulation engine.
//!
//! The harness registers thresholds on every eligible heap pool, subscribes a
//! watcher to the manager's notifications, and then allocates until the
//! manager reports exhaustion. Reports are produced every `report_interval`
//! allocations, on each recognised threshold notification, and once at the end.

pub mod harness;
pub mod metrics;
pub mod population;
pub mod registry;
pub mod reporter;
pub mod simulator;
pub mod stop;
pub mod watcher;

pub use harness::{Harness, HarnessError, HarnessReport, HarnessState};
pub use population::{PopulationCounts, PopulationOf, ReferencePopulation};
pub use registry::{InstalledThreshold, PoolRegistry, Registration, SkippedPool};
pub use reporter::{ConsoleReporter, MemoryReporter, Reporter, Snapshot, Trigger};
pub use simulator::{Coin, PressureSimulator, RunOutcome, ScriptedCoin, SeededCoin};
pub use stop::{Interrupted, StopToken};
pub use watcher::ThresholdWatcher;
