//! Sink entry and statistics types
//!
//! A sink is the broadcaster of one key together with the worker feeding it.
//! The key's queue lives in a separate map; the registry creates and removes
//! both together.

use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::Broadcaster;
use crate::dispatch::DispatchWorker;

/// Broadcaster and dispatch worker of one key
pub(super) struct SinkEntry<K, V> {
    /// Consumers of this key
    pub(super) broadcaster: Arc<Broadcaster<K, V>>,

    /// Task draining the key's queue into the broadcaster
    pub(super) worker: DispatchWorker,

    /// When the first subscriber arrived
    pub(super) created_at: Instant,
}

/// Statistics for one key
#[derive(Debug, Clone)]
pub struct KeyStats {
    /// Number of registered consumers
    pub subscriber_count: usize,
    /// Values waiting in the key's queue
    pub pending: usize,
    /// Successful consumer invocations
    pub delivered: u64,
    /// Failed consumer invocations
    pub failures: u64,
    /// Whether the dispatch worker is still running
    pub worker_running: bool,
    /// When the sink was created
    pub created_at: Instant,
}
