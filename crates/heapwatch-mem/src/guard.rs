//! RAII memory blocks.
//!
//! A `Block` accounts its bytes against a pool before touching the allocator
//! and returns them on drop (panic-safe).

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::pool::PoolState;

pub struct Block {
    pool: Arc<PoolState>,
    bytes: u64,
    buf: Vec<u8>,
}

impl Block {
    /// Materialise a zeroed buffer for bytes already accounted on `pool`.
    ///
    /// On allocator refusal the accounted bytes are returned and `None` is
    /// produced.
    pub(crate) fn materialise(pool: Arc<PoolState>, len: usize) -> Option<Self> {
        let mut buf = Vec::new();
        if buf.try_reserve_exact(len).is_err() {
            pool.release(len as u64);
            return None;
        }
        buf.resize(len, 0u8);
        Some(Self {
            pool,
            bytes: len as u64,
            buf,
        })
    }

    /// Accounted size (bytes).
    pub fn accounted_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.pool.release(self.bytes);
            // NOTE: do not log here to keep drop path fast.
            self.bytes = 0;
        }
    }
}

impl Deref for Block {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("pool", &self.pool.name())
            .field("bytes", &self.bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapwatch_core::config::PoolSpec;

    #[test]
    fn drop_returns_bytes() {
        let pool = Arc::new(PoolState::new(&PoolSpec::heap("old-gen", Some(1024))));
        assert!(pool.try_acquire(512).is_some());
        {
            let block = Block::materialise(Arc::clone(&pool), 512).unwrap();
            assert_eq!(block.len(), 512);
            assert_eq!(block.accounted_bytes(), 512);
            assert_eq!(pool.used(), 512);
        }
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn allocator_refusal_returns_accounted_bytes() {
        // Unbounded pools accept any reservation; the allocator cannot.
        let pool = Arc::new(PoolState::new(&PoolSpec::heap("eden", None)));
        let len = usize::MAX;
        assert_eq!(pool.try_acquire(len as u64), Some(None));
        assert_eq!(pool.used(), len as u64);

        assert!(Block::materialise(Arc::clone(&pool), len).is_none());
        assert_eq!(pool.used(), 0);
    }
}
