//! Memory notifications as delivered by a memory manager.
//!
//! The channel may carry types other than the two threshold kinds; consumers
//! classify by `type_name` and drop everything they do not recognise.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::usage::MemoryUsage;

/// Pool usage reached or exceeded its usage threshold.
pub const MEMORY_THRESHOLD_EXCEEDED: &str = "memory.threshold.exceeded";
/// Pool usage measured right after a collection reached its collection-usage threshold.
pub const MEMORY_COLLECTION_THRESHOLD_EXCEEDED: &str = "memory.collection.threshold.exceeded";
/// A collection cycle finished. Informational.
pub const COLLECTION_COMPLETED: &str = "memory.collection.completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub type_name: String,
    pub pool: String,
    /// Pool usage at the time the event was raised.
    pub usage: MemoryUsage,
    /// Number of times this kind of threshold has been crossed on the pool.
    pub count: u64,
    /// Manager-wide sequence number.
    pub sequence: u64,
}

/// The two recognised threshold crossings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    UsageExceeded,
    CollectionUsageExceeded,
}

impl ThresholdKind {
    /// Classify a notification type. Unrelated types yield `None`.
    pub fn classify(type_name: &str) -> Option<Self> {
        match type_name {
            MEMORY_THRESHOLD_EXCEEDED => Some(ThresholdKind::UsageExceeded),
            MEMORY_COLLECTION_THRESHOLD_EXCEEDED => Some(ThresholdKind::CollectionUsageExceeded),
            _ => None,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            ThresholdKind::UsageExceeded => MEMORY_THRESHOLD_EXCEEDED,
            ThresholdKind::CollectionUsageExceeded => MEMORY_COLLECTION_THRESHOLD_EXCEEDED,
        }
    }

    /// Whether the crossing was measured after a collection.
    pub fn is_post_collection(self) -> bool {
        matches!(self, ThresholdKind::CollectionUsageExceeded)
    }
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}
