#![forbid(unsafe_code)]
//! heapwatch-mem: a managed heap that plays the runtime memory manager.
//!
//! This crate provides the concrete implementation of the interfaces defined
//! in `heapwatch-core::manager`: bounded pools with hard accounting, RAII
//! blocks, soft handles cleared by a collector under pressure, and a
//! notification thread that reports threshold crossings.

pub mod error;
pub mod guard;
pub mod heap;
pub mod notify;
pub mod pool;
pub mod soft;
pub mod tracking;

pub use error::{Error, Result};
pub use guard::Block;
pub use heap::ManagedHeap;
pub use soft::SoftHandle;
