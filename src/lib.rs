//! In-process key-partitioned publish/subscribe multiplexer
//!
//! Producers enqueue values under a routing key. Consumers subscribed to that
//! key receive every value enqueued after they subscribe, delivered by a
//! background dispatch task dedicated to the key.
//!
//! ```text
//! producer ──► Registry::enqueue(k, v) ──► Queue(k)
//!                                             │ drain (batch)
//!                                             ▼
//!                                      DispatchWorker(k)
//!                                             │ deliver
//!                                             ▼
//!                                      Broadcaster(k) ──► consumer.consume(k, v)
//!                                                     ──► consumer.consume(k, v)
//! ```
//!
//! Per key, each consumer sees values in enqueue order. Nothing is ordered
//! across keys, and a slow or failing consumer only affects its own key.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use keyed_mux::{consumer_fn, Registry};
//!
//! # async fn example() -> keyed_mux::Result<()> {
//! let registry: Registry<String, u64> = Registry::new();
//!
//! registry.subscribe(
//!     &"orders".to_string(),
//!     consumer_fn(|key: &String, value: &u64| {
//!         println!("{key}: {value}");
//!         Ok(())
//!     }),
//! );
//!
//! registry.enqueue(&"orders".to_string(), 42)?;
//!
//! // Deliver everything already enqueued, then stop the workers
//! registry.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod registry;

pub use broadcast::{consumer_fn, Broadcaster, Consumer};
pub use dispatch::DispatchWorker;
pub use error::{ConsumerError, Error, Result};
pub use queue::Queue;
pub use registry::{KeyStats, Registry, RegistryConfig};
