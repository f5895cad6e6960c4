//! Notification-driven reporting.
//!
//! The watcher runs on the manager's delivery thread. It reads the population
//! (never mutates it) and holds the manager weakly so the manager's listener
//! list does not keep the manager alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use heapwatch_core::manager::{MemoryManager, NotificationListener};
use heapwatch_core::notification::{Notification, ThresholdKind};

use crate::population::PopulationOf;
use crate::reporter::{Reporter, Snapshot};

pub struct ThresholdWatcher<M: MemoryManager> {
    manager: Weak<M>,
    population: Arc<PopulationOf<M>>,
    reporter: Arc<dyn Reporter>,
    block_size: usize,
    handled: AtomicU64,
    ignored: AtomicU64,
}

impl<M: MemoryManager> ThresholdWatcher<M> {
    pub fn new(
        manager: &Arc<M>,
        population: Arc<PopulationOf<M>>,
        reporter: Arc<dyn Reporter>,
        block_size: usize,
    ) -> Self {
        Self {
            manager: Arc::downgrade(manager),
            population,
            reporter,
            block_size,
            handled: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
        }
    }

    /// Subscribe a new watcher to `manager` and return it.
    pub fn install(
        manager: &Arc<M>,
        population: Arc<PopulationOf<M>>,
        reporter: Arc<dyn Reporter>,
        block_size: usize,
    ) -> Arc<Self> {
        let watcher = Arc::new(Self::new(manager, population, reporter, block_size));
        manager.add_listener(Arc::clone(&watcher) as Arc<dyn NotificationListener>);
        watcher
    }

    /// Threshold notifications turned into reports so far.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Acquire)
    }

    /// Notifications of unrelated types.
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Acquire)
    }

    fn on_threshold(&self, kind: ThresholdKind, notification: &Notification) {
        let counts = self.population.counts();
        // The event's own usage stands in once the manager is gone.
        let heap_usage = self
            .manager
            .upgrade()
            .map(|m| m.heap_usage())
            .unwrap_or(notification.usage);
        tracing::debug!(
            %kind,
            pool = %notification.pool,
            count = notification.count,
            used = heap_usage.used,
            "threshold notification"
        );
        self.reporter.report(&Snapshot::threshold(
            kind,
            notification.pool.clone(),
            counts,
            heap_usage,
            self.block_size,
        ));
        self.handled.fetch_add(1, Ordering::AcqRel);
    }
}

impl<M: MemoryManager> NotificationListener for ThresholdWatcher<M> {
    fn handle_notification(&self, notification: &Notification) {
        match ThresholdKind::classify(&notification.type_name) {
            Some(kind) => self.on_threshold(kind, notification),
            None => {
                tracing::trace!(type_name = %notification.type_name, "ignoring notification");
                self.ignored.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}
