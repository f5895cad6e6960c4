//! Cooperative interruption.
//!
//! A `StopToken` is the only cancellation primitive of the harness. The
//! simulator honours it at its pause point only; once requested the token
//! stays signalled so whoever supervises the run can observe it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted while pausing")]
pub struct Interrupted;

#[derive(Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        *self.inner.stopped.lock() = true;
        self.inner.wake.notify_all();
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for `duration` unless a stop is (or gets) requested.
    pub fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
        let deadline = Instant::now() + duration;
        let mut stopped = self.inner.stopped.lock();
        loop {
            if *stopped {
                return Err(Interrupted);
            }
            if self.inner.wake.wait_until(&mut stopped, deadline).timed_out() {
                return if *stopped { Err(Interrupted) } else { Ok(()) };
            }
        }
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stopped", &self.is_stop_requested())
            .finish()
    }
}
