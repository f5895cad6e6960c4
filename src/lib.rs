#![forbid(unsafe_code)]
//! heapwatch: drive a managed heap toward exhaustion and observe its
//! threshold notifications.
//!
//! Facade over the workspace crates; integration tests and benches build
//! against this package.

pub use heapwatch_core;
pub use heapwatch_exec;
pub use heapwatch_mem;

pub use heapwatch_core::config::HarnessConfig;
pub use heapwatch_exec::{Harness, HarnessReport, StopToken};
pub use heapwatch_mem::ManagedHeap;
