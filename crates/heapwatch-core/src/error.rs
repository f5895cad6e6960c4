use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown memory pool '{0}'")]
    UnknownPool(String),

    #[error("Pool '{pool}' does not support {what}")]
    ThresholdUnsupported { pool: String, what: &'static str },

    #[error("Invalid threshold {threshold} for pool '{pool}' (max {max:?})")]
    InvalidThreshold {
        pool: String,
        threshold: u64,
        max: Option<u64>,
    },
}

/// Signal raised by the allocation primitive when no further memory can be
/// made available, even after a collection.
///
/// This is the expected end-of-run condition of the harness, so it is kept
/// apart from [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("memory exhausted in pool '{pool}': requested {requested} bytes, capacity {capacity}, used {used}")]
pub struct Exhausted {
    pub pool: String,
    pub requested: usize,
    pub capacity: u64,
    pub used: u64,
}
