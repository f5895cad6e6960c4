//! Shared state of the run: retained blocks and reclaimable handles.
//!
//! Only the simulator appends. Readers (the simulator's own reports and the
//! watcher on the notification thread) never iterate the live vectors; the
//! live-reclaimable count is taken over a copy made under the lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use heapwatch_core::manager::{MemoryManager, Reclaimable};

/// Population shaped for a particular manager.
pub type PopulationOf<M> =
    ReferencePopulation<<M as MemoryManager>::Block, <M as MemoryManager>::Handle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub retained: usize,
    pub reclaimable: usize,
    pub live_reclaimable: usize,
}

impl PopulationCounts {
    pub fn total(&self) -> usize {
        self.retained + self.reclaimable
    }
}

pub struct ReferencePopulation<B, H> {
    retained: Mutex<Vec<B>>,
    reclaimable: Mutex<Vec<H>>,
}

impl<B, H> Default for ReferencePopulation<B, H> {
    fn default() -> Self {
        Self {
            retained: Mutex::new(Vec::new()),
            reclaimable: Mutex::new(Vec::new()),
        }
    }
}

impl<B, H: Reclaimable> ReferencePopulation<B, H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_retained(&self, block: B) {
        self.retained.lock().push(block);
    }

    pub fn add_reclaimable(&self, handle: H) {
        self.reclaimable.lock().push(handle);
    }

    pub fn retained_len(&self) -> usize {
        self.retained.lock().len()
    }

    pub fn reclaimable_len(&self) -> usize {
        self.reclaimable.lock().len()
    }

    /// Number of reclaimable handles whose referent has not been cleared.
    ///
    /// Computed over a point-in-time copy, so it never exceeds the number of
    /// handles added before the copy was taken.
    pub fn count_live_reclaimable(&self) -> usize {
        let snapshot: Vec<H> = self.reclaimable.lock().clone();
        snapshot.iter().filter(|h| h.is_live()).count()
    }

    pub fn counts(&self) -> PopulationCounts {
        PopulationCounts {
            retained: self.retained_len(),
            reclaimable: self.reclaimable_len(),
            live_reclaimable: self.count_live_reclaimable(),
        }
    }
}
