//! Registry implementation
//!
//! Routes enqueued values to per-key queues and manages the lifetime of
//! each key's sink.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::runtime::Handle;

use crate::broadcast::{Broadcaster, Consumer};
use crate::dispatch::DispatchWorker;
use crate::error::{Error, Result};
use crate::queue::Queue;

use super::config::RegistryConfig;
use super::entry::{KeyStats, SinkEntry};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Central registry for all active keys
///
/// Safe to share between threads (usually behind an `Arc`). The queue map
/// and the sink map are guarded independently; there is no global lock.
///
/// Dropping the registry stops every queue without waiting for workers.
/// Use [`shutdown`](Self::shutdown) to flush pending values first.
pub struct Registry<K, V> {
    /// Map of key to pending values
    queues: Mutex<HashMap<K, Arc<Queue<V>>>>,

    /// Map of key to broadcaster and dispatch worker
    sinks: Mutex<HashMap<K, SinkEntry<K, V>>>,

    /// Runtime dispatch workers are spawned on
    runtime: Handle,

    /// Configuration
    config: RegistryConfig,
}

impl<K, V> Registry<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Create a new registry with default configuration
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    ///
    /// # Panics
    ///
    /// Panics when `config.runtime` is unset and this is called outside of a
    /// tokio runtime.
    pub fn with_config(config: RegistryConfig) -> Self {
        let runtime = config.runtime.clone().unwrap_or_else(Handle::current);

        Self {
            queues: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
            runtime,
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get the queue for a key, creating it if needed
    fn queue(&self, key: &K) -> Arc<Queue<V>> {
        let mut queues = lock(&self.queues);

        if let Some(queue) = queues.get(key) {
            return Arc::clone(queue);
        }

        let queue = Arc::new(Queue::with_limit(self.config.max_pending));
        queues.insert(key.clone(), Arc::clone(&queue));
        tracing::debug!(key = ?key, "Queue created");
        queue
    }

    /// Subscribe a consumer to a key
    ///
    /// The first subscriber of a key creates its sink and starts the key's
    /// dispatch worker; values enqueued before that point are delivered to
    /// it. Later subscribers join the existing broadcaster and receive
    /// values from the next delivered batch on.
    pub fn subscribe(&self, key: &K, consumer: Arc<dyn Consumer<K, V>>) {
        let mut sinks = lock(&self.sinks);

        if let Some(entry) = sinks.get(key) {
            entry.broadcaster.subscribe(consumer);

            tracing::debug!(
                key = ?key,
                subscribers = entry.broadcaster.consumer_count(),
                "Consumer added (existing sink)"
            );
            return;
        }

        // Register before the worker starts so the first batch reaches it
        let broadcaster = Arc::new(Broadcaster::new(key.clone()));
        broadcaster.subscribe(consumer);

        let queue = self.queue(key);
        let worker = DispatchWorker::spawn(&self.runtime, key.clone(), &queue, &broadcaster);

        sinks.insert(
            key.clone(),
            SinkEntry {
                broadcaster,
                worker,
                created_at: Instant::now(),
            },
        );

        tracing::info!(key = ?key, pending = queue.len(), "Sink created");
    }

    /// Tear down a key
    ///
    /// Stops and removes the key's queue, then removes its sink. The worker
    /// is not joined; it delivers the values still pending to the consumers
    /// subscribed so far, then exits. Unknown keys are ignored.
    pub fn unsubscribe(&self, key: &K) {
        let mut sinks = lock(&self.sinks);

        let queue = {
            let mut queues = lock(&self.queues);
            if let Some(queue) = queues.get(key) {
                queue.stop();
            }
            queues.remove(key)
        };

        let sink = sinks.remove(key);
        drop(sinks);

        match (queue, sink) {
            (None, None) => {}
            (queue, sink) => {
                tracing::info!(
                    key = ?key,
                    pending = queue.map_or(0, |q| q.len()),
                    subscribers = sink.map_or(0, |s| s.broadcaster.consumer_count()),
                    "Key unsubscribed"
                );
            }
        }
    }

    /// Enqueue a value for a key
    ///
    /// Creates the key's queue if needed, so producers may run ahead of any
    /// subscriber. Fails with [`Error::QueueStopped`] when the key is torn
    /// down concurrently, or [`Error::QueueFull`] when a pending limit is
    /// configured and reached; the value is not delivered in either case.
    pub fn enqueue(&self, key: &K, value: V) -> Result<()> {
        self.queue(key).enqueue(value)
    }

    /// Whether a key has a sink
    pub fn is_subscribed(&self, key: &K) -> bool {
        lock(&self.sinks).contains_key(key)
    }

    /// Number of keys with a sink
    pub fn key_count(&self) -> usize {
        lock(&self.sinks).len()
    }

    /// Number of keys with a queue, including keys nobody subscribed to yet
    pub fn queue_count(&self) -> usize {
        lock(&self.queues).len()
    }

    /// Get statistics for a subscribed key
    pub fn stats(&self, key: &K) -> Option<KeyStats> {
        let mut stats = {
            let sinks = lock(&self.sinks);
            let entry = sinks.get(key)?;
            KeyStats {
                subscriber_count: entry.broadcaster.consumer_count(),
                pending: 0,
                delivered: entry.broadcaster.delivered(),
                failures: entry.broadcaster.failures(),
                worker_running: !entry.worker.is_finished(),
                created_at: entry.created_at,
            }
        };

        stats.pending = lock(&self.queues).get(key).map_or(0, |q| q.len());
        Some(stats)
    }

    /// Stop every key and wait for the dispatch workers to deliver what was
    /// already enqueued
    ///
    /// Waits at most `shutdown_timeout`. Values of keys without a subscriber
    /// are discarded.
    pub async fn shutdown(mut self) -> Result<()> {
        let queues = std::mem::take(
            self.queues
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let sinks = std::mem::take(self.sinks.get_mut().unwrap_or_else(PoisonError::into_inner));

        for queue in queues.values() {
            queue.stop();
        }

        // Broadcasters stay alive until the workers have flushed
        let (broadcasters, workers): (Vec<_>, Vec<_>) = sinks
            .into_values()
            .map(|entry| (entry.broadcaster, entry.worker))
            .unzip();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let mut pending = 0;
        for worker in workers {
            if tokio::time::timeout_at(deadline, worker.join()).await.is_err() {
                pending += 1;
            }
        }

        drop(broadcasters);
        drop(queues);

        if pending > 0 {
            tracing::warn!(
                pending = pending,
                timeout = ?self.config.shutdown_timeout,
                "Shutdown timed out"
            );
            return Err(Error::ShutdownTimeout { pending });
        }

        tracing::info!("Registry shut down");
        Ok(())
    }
}

impl<K, V> Default for Registry<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for Registry<K, V> {
    fn drop(&mut self) {
        // Close broadcasters first so a worker woken by the stop below
        // cannot start another delivery
        let sinks = std::mem::take(self.sinks.get_mut().unwrap_or_else(PoisonError::into_inner));
        for entry in sinks.values() {
            entry.broadcaster.close();
        }

        let queues = self
            .queues
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in queues.values() {
            queue.stop();
        }

        if !sinks.is_empty() || !queues.is_empty() {
            tracing::debug!(
                keys = sinks.len(),
                queues = queues.len(),
                "Registry dropped, queues stopped"
            );
        }
    }
}
