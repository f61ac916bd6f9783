//! Per-key fan-out
//!
//! A [`Broadcaster`] owns the consumer handles subscribed to one key and
//! hands every drained batch to each of them. Consumer failures never leave
//! the broadcaster: they are logged, counted and skipped.

pub mod broadcaster;
pub mod consumer;

pub use broadcaster::Broadcaster;
pub use consumer::{consumer_fn, Consumer, FnConsumer};
