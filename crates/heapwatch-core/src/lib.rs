#![forbid(unsafe_code)]
//! heapwatch-core: shared types and interfaces for the heapwatch harness.
//!
//! Nothing in here allocates on behalf of the harness or spawns threads. The
//! managed heap lives in `heapwatch-mem`; the monitoring engine lives in
//! `heapwatch-exec`. Both talk to each other only through [`manager::MemoryManager`].

pub mod config;
pub mod error;
pub mod manager;
pub mod notification;
pub mod usage;
