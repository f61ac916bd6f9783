//! Key registry for pub/sub routing
//!
//! The registry owns all per-key state. A key's queue is created by the first
//! `enqueue` or `subscribe` that names it; its sink (broadcaster + dispatch
//! worker) by the first `subscribe`. `unsubscribe` tears both down.
//!
//! # Architecture
//!
//! ```text
//!                            Registry<K, V>
//!              ┌──────────────────────────────────────────┐
//!              │ queues: Mutex<HashMap<K, Arc<Queue>>>    │
//!              │ sinks:  Mutex<HashMap<K, SinkEntry {     │
//!              │            broadcaster: Arc<..>,         │
//!              │            worker: DispatchWorker,       │
//!              │         }>>                              │
//!              └──────┬───────────────────────────┬───────┘
//!                     │ strong                    │ strong
//!                     ▼                           ▼
//!   enqueue() ──► [Queue(k)] ◄─weak── worker ─weak─► [Broadcaster(k)]
//!                                       │                  │
//!                                       └─ drain ─► deliver ──► consumers
//! ```
//!
//! # Ownership
//!
//! Workers hold weak references between cycles, and strong ones only while
//! a cycle runs. After `unsubscribe` a worker keeps the key alive just long
//! enough to deliver the values already accepted. Dropping the registry
//! closes every broadcaster first, so no delivery starts after teardown.

pub mod config;
pub mod entry;
pub mod store;

pub use config::RegistryConfig;
pub use entry::KeyStats;
pub use store::Registry;
