//! Soft references.
//!
//! Softening a block moves its only strong owner into the collector's table;
//! the caller keeps a `SoftHandle` that can observe, but not prolong, the
//! block's life. The collector clears the oldest referents first.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use heapwatch_core::manager::Reclaimable;

use crate::guard::Block;

/// Handle to a block the collector may clear at any time.
#[derive(Clone, Debug)]
pub struct SoftHandle {
    referent: Weak<Block>,
}

impl Reclaimable for SoftHandle {
    type Referent = Arc<Block>;

    fn get(&self) -> Option<Arc<Block>> {
        self.referent.upgrade()
    }

    fn is_live(&self) -> bool {
        self.referent.strong_count() > 0
    }
}

/// Strong owners of softened blocks, oldest first.
#[derive(Default)]
pub struct SoftTable {
    referents: Mutex<VecDeque<Arc<Block>>>,
}

impl SoftTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block: Block) -> SoftHandle {
        let strong = Arc::new(block);
        let handle = SoftHandle {
            referent: Arc::downgrade(&strong),
        };
        self.referents.lock().push_back(strong);
        handle
    }

    pub fn len(&self) -> usize {
        self.referents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear referents oldest-first until `done` reports enough was freed.
    /// Returns the number of referents cleared.
    pub fn clear_until(&self, mut done: impl FnMut() -> bool) -> usize {
        let mut referents = self.referents.lock();
        let mut cleared = 0;
        while !done() {
            match referents.pop_front() {
                Some(strong) => {
                    drop(strong);
                    cleared += 1;
                }
                None => break,
            }
        }
        cleared
    }

    pub fn clear_all(&self) -> usize {
        let drained: Vec<_> = self.referents.lock().drain(..).collect();
        drained.len()
    }
}
