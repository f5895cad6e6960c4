//! Snapshot reporting.
//!
//! Reporters are called from the allocation loop and from the notification
//! thread. They must never fail into their caller: output errors are logged
//! and dropped.

use std::fmt;
use std::io::{self, Stdout, Write};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use heapwatch_core::config::ReportFormat;
use heapwatch_core::notification::ThresholdKind;
use heapwatch_core::usage::{MemoryUsage, MIB};

use crate::metrics::emit_span;
use crate::population::PopulationCounts;

/// What caused a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    Periodic { allocations: u64 },
    Threshold { kind: ThresholdKind, pool: String },
    Final { allocations: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub trigger: Trigger,
    pub counts: PopulationCounts,
    /// Heap usage; only threshold reports carry it.
    pub heap_usage: Option<MemoryUsage>,
    /// True when the triggering event was measured after a collection.
    pub after_gc: bool,
    pub block_size: usize,
}

impl Snapshot {
    pub fn periodic(allocations: u64, counts: PopulationCounts, block_size: usize) -> Self {
        Self {
            trigger: Trigger::Periodic { allocations },
            counts,
            heap_usage: None,
            after_gc: false,
            block_size,
        }
    }

    pub fn final_report(allocations: u64, counts: PopulationCounts, block_size: usize) -> Self {
        Self {
            trigger: Trigger::Final { allocations },
            counts,
            heap_usage: None,
            after_gc: false,
            block_size,
        }
    }

    pub fn threshold(
        kind: ThresholdKind,
        pool: impl Into<String>,
        counts: PopulationCounts,
        heap_usage: MemoryUsage,
        block_size: usize,
    ) -> Self {
        Self {
            trigger: Trigger::Threshold {
                kind,
                pool: pool.into(),
            },
            counts,
            heap_usage: Some(heap_usage),
            after_gc: kind.is_post_collection(),
            block_size,
        }
    }

    fn mib(&self, blocks: usize) -> u64 {
        (blocks as u64).saturating_mul(self.block_size as u64) / MIB
    }

    fn event_name(&self) -> &'static str {
        match self.trigger {
            Trigger::Periodic { .. } => "report.periodic",
            Trigger::Threshold { .. } => "report.threshold",
            Trigger::Final { .. } => "report.final",
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match &self.trigger {
            Trigger::Periodic { allocations } => {
                writeln!(f, "Allocation cycle {}", allocations)?;
                ""
            }
            Trigger::Threshold { kind, pool } => {
                match kind {
                    ThresholdKind::UsageExceeded => {
                        writeln!(f, "Memory usage threshold exceeded on {}!", pool)?
                    }
                    ThresholdKind::CollectionUsageExceeded => {
                        writeln!(f, "Memory collection threshold exceeded on {}!", pool)?
                    }
                }
                ""
            }
            Trigger::Final { allocations } => {
                writeln!(f, "Memory exhausted after {} allocations!", allocations)?;
                "Final "
            }
        };
        if let Some(usage) = &self.heap_usage {
            writeln!(f, "Heap memory usage: {}", usage)?;
        }
        let c = &self.counts;
        writeln!(f, "{}retained blocks: {} ({} MiB)", prefix, c.retained, self.mib(c.retained))?;
        writeln!(
            f,
            "{}reclaimable blocks: {} ({} MiB)",
            prefix,
            c.reclaimable,
            self.mib(c.reclaimable)
        )?;
        write!(
            f,
            "{}live reclaimable blocks: {} ({} MiB)",
            prefix,
            c.live_reclaimable,
            self.mib(c.live_reclaimable)
        )?;
        if let Trigger::Threshold { .. } = self.trigger {
            write!(f, "\nAfter GC: {}", self.after_gc)?;
        }
        Ok(())
    }
}

/// Sink for snapshots. Infallible by contract.
pub trait Reporter: Send + Sync {
    fn report(&self, snapshot: &Snapshot);
}

/// Renders snapshots as text blocks or JSON lines onto a writer.
pub struct ConsoleReporter<W: Write + Send> {
    out: Mutex<W>,
    format: ReportFormat,
}

impl ConsoleReporter<Stdout> {
    pub fn stdout(format: ReportFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write + Send> ConsoleReporter<W> {
    pub fn new(out: W, format: ReportFormat) -> Self {
        Self {
            out: Mutex::new(out),
            format,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn render(&self, snapshot: &Snapshot) -> Option<String> {
        match self.format {
            ReportFormat::Text => Some(format!("\n{}", snapshot)),
            ReportFormat::Json => match serde_json::to_string(snapshot) {
                Ok(line) => Some(line),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode snapshot");
                    None
                }
            },
        }
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&self, snapshot: &Snapshot) {
        emit_span(
            snapshot.event_name(),
            &[
                ("retained", snapshot.counts.retained.to_string()),
                ("reclaimable", snapshot.counts.reclaimable.to_string()),
                ("live_reclaimable", snapshot.counts.live_reclaimable.to_string()),
            ],
        );
        let Some(rendered) = self.render(snapshot) else {
            return;
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", rendered).and_then(|_| out.flush()) {
            tracing::warn!(error = %e, "failed to write report");
        }
    }
}

/// Keeps every snapshot in memory.
#[derive(Default)]
pub struct MemoryReporter {
    snapshots: Mutex<Vec<Snapshot>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, snapshot: &Snapshot) {
        self.snapshots.lock().push(snapshot.clone());
    }
}
