//! Per-key blocking mailbox
//!
//! Producers append values from any thread; a single dispatch worker drains
//! the whole pending run at once. Stopping is one-way: once stopped, the
//! queue rejects new values but still hands out whatever was pending.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::{Error, Result};

struct Pending<V> {
    values: Vec<V>,
    stopped: bool,
}

/// Pending values for one key
pub struct Queue<V> {
    pending: Mutex<Pending<V>>,
    notify: Notify,
    /// Maximum number of pending values (0 = unlimited)
    limit: usize,
}

impl<V> Queue<V> {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Create a queue that holds at most `limit` pending values (0 = unlimited)
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: Mutex::new(Pending {
                values: Vec::new(),
                stopped: false,
            }),
            notify: Notify::new(),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending<V>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a value and wake the drainer
    ///
    /// Fails with [`Error::QueueStopped`] once [`stop`](Self::stop) has been
    /// called, and with [`Error::QueueFull`] when a limit is set and reached.
    /// On failure the value is dropped.
    pub fn enqueue(&self, value: V) -> Result<()> {
        {
            let mut pending = self.lock();
            if pending.stopped {
                return Err(Error::QueueStopped);
            }
            if self.limit > 0 && pending.values.len() >= self.limit {
                return Err(Error::QueueFull { limit: self.limit });
            }
            pending.values.push(value);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Mark the queue stopped and wake the drainer. Idempotent.
    pub fn stop(&self) {
        self.lock().stopped = true;
        self.notify.notify_one();
    }

    /// Wait until values are pending or the queue is stopped, then take
    /// every pending value.
    ///
    /// Returns the batch in enqueue order together with the stopped flag.
    /// A stopped queue never suspends; it returns whatever is left (possibly
    /// nothing).
    pub async fn drain(&self) -> (Vec<V>, bool) {
        loop {
            {
                let mut pending = self.lock();
                if !pending.values.is_empty() || pending.stopped {
                    return (std::mem::take(&mut pending.values), pending.stopped);
                }
            }
            // notify_one leaves a permit when nobody waits, so a value pushed
            // between the check above and this await is not missed.
            self.notify.notified().await;
        }
    }

    /// Number of pending values
    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    /// Whether no values are pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }
}

impl<V> Default for Queue<V> {
    fn default() -> Self {
        Self::new()
    }
}
