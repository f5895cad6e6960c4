use thiserror::Error;

/// Result type local to heapwatch-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] heapwatch_core::error::Error),

    #[error("failed to start notification thread: {0}")]
    Spawn(#[from] std::io::Error),
}
