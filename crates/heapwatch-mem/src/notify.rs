//! Notification delivery.
//!
//! Events are queued without blocking the allocating thread and delivered in
//! order by one dedicated thread to every registered listener.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::RwLock;

use heapwatch_core::manager::NotificationListener;
use heapwatch_core::notification::Notification;
use heapwatch_core::usage::MemoryUsage;

use crate::error::Result;

type Listeners = Arc<RwLock<Vec<Arc<dyn NotificationListener>>>>;

pub const THREAD_NAME: &str = "heapwatch-notifier";

enum Message {
    Deliver(Notification),
    /// Acknowledged once everything queued before it has been delivered.
    Flush(Sender<()>),
}

pub struct Notifier {
    tx: Option<Sender<Message>>,
    listeners: Listeners,
    sequence: AtomicU64,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl Notifier {
    pub fn start() -> Result<Self> {
        let (tx, rx) = unbounded();
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));
        let worker = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn({
                let listeners = Arc::clone(&listeners);
                move || deliver(rx, listeners)
            })?;
        let worker_id = worker.thread().id();
        Ok(Self {
            tx: Some(tx),
            listeners,
            sequence: AtomicU64::new(0),
            worker: Some(worker),
            worker_id,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Queue a notification. Never blocks.
    pub fn emit(&self, type_name: &str, pool: &str, usage: MemoryUsage, count: u64) {
        let notification = Notification {
            type_name: type_name.to_string(),
            pool: pool.to_string(),
            usage,
            count,
            sequence: self.sequence.fetch_add(1, Ordering::AcqRel) + 1,
        };
        if let Some(tx) = &self.tx {
            // Only fails once the worker is gone, i.e. during shutdown.
            let _ = tx.send(Message::Deliver(notification));
        }
    }

    /// Block until every notification emitted so far has been delivered.
    ///
    /// No-op when called from a listener, which already runs on the worker.
    pub fn flush(&self) {
        if thread::current().id() == self.worker_id {
            return;
        }
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            // The last owner may be released by a listener on the worker itself.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}

fn deliver(rx: Receiver<Message>, listeners: Listeners) {
    for message in rx.iter() {
        let notification = match message {
            Message::Deliver(notification) => notification,
            Message::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
        };
        let current: Vec<_> = listeners.read().iter().cloned().collect();
        for listener in current {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.handle_notification(&notification)
            }));
            if outcome.is_err() {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    type_name = %notification.type_name,
                    sequence = notification.sequence,
                    "notification listener panicked"
                );
            }
        }
    }
}
