//! Fan-out of drained batches to the consumers of one key

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{panic_message, ConsumerError};

use super::consumer::Consumer;

/// Consumer handles registered for one key
pub struct Broadcaster<K, V> {
    key: K,
    consumers: RwLock<Vec<Arc<dyn Consumer<K, V>>>>,
    /// Successful consumer invocations
    delivered: AtomicU64,
    /// Failed or panicked consumer invocations
    failures: AtomicU64,
    /// Set on registry teardown; no delivery starts afterwards
    closed: AtomicBool,
}

impl<K, V> Broadcaster<K, V> {
    /// Refuse every later delivery. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<K: Debug, V> Broadcaster<K, V> {
    /// Create a broadcaster with no consumers
    pub fn new(key: K) -> Self {
        Self {
            key,
            consumers: RwLock::new(Vec::new()),
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// The key this broadcaster serves
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Register a consumer. It receives every batch delivered after this call.
    pub fn subscribe(&self, consumer: Arc<dyn Consumer<K, V>>) {
        self.consumers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(consumer);
    }

    /// Number of registered consumers
    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Successful consumer invocations so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Failed consumer invocations so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver a batch to every registered consumer
    ///
    /// Values go out in batch order; for each value consumers are invoked in
    /// registration order. The consumer list is snapshotted first, so a
    /// consumer that subscribes mid-delivery starts with the next batch.
    /// A failing consumer is logged and skipped; the others still receive
    /// the value. A closed broadcaster drops the batch.
    pub fn deliver(&self, batch: &[V]) {
        if batch.is_empty() || self.is_closed() {
            return;
        }

        let consumers: Vec<Arc<dyn Consumer<K, V>>> = self
            .consumers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for value in batch {
            for consumer in &consumers {
                match self.invoke(consumer.as_ref(), value) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            key = ?self.key,
                            consumer = consumer.name(),
                            error = %e,
                            "Consumer failed"
                        );
                    }
                }
            }
        }
    }

    fn invoke(&self, consumer: &dyn Consumer<K, V>, value: &V) -> Result<(), ConsumerError> {
        match catch_unwind(AssertUnwindSafe(|| consumer.consume(&self.key, value))) {
            Ok(result) => result,
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::broadcast::consumer_fn;

    /// Records every (consumer tag, value) pair in one shared log
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<(&'static str, u32)>>>,
    }

    impl Consumer<&'static str, u32> for Recorder {
        fn consume(&self, _key: &&'static str, value: &u32) -> Result<(), ConsumerError> {
            self.log.lock().unwrap().push((self.tag, *value));
            Ok(())
        }
    }

    struct Failing;

    impl Consumer<&'static str, u32> for Failing {
        fn consume(&self, _key: &&'static str, _value: &u32) -> Result<(), ConsumerError> {
            Err("always fails".into())
        }
    }

    struct Panicking;

    impl Consumer<&'static str, u32> for Panicking {
        fn consume(&self, _key: &&'static str, _value: &u32) -> Result<(), ConsumerError> {
            panic!("consumer blew up");
        }
    }

    fn recorder(tag: &'static str, log: &Arc<Mutex<Vec<(&'static str, u32)>>>) -> Arc<Recorder> {
        Arc::new(Recorder {
            tag,
            log: Arc::clone(log),
        })
    }

    #[test]
    fn test_deliver_in_batch_then_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<&'static str, u32> = Broadcaster::new("k");
        broadcaster.subscribe(recorder("a", &log));
        broadcaster.subscribe(recorder("b", &log));
        assert_eq!(broadcaster.consumer_count(), 2);

        broadcaster.deliver(&[1, 2]);

        assert_eq!(
            *log.lock().unwrap(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
        assert_eq!(broadcaster.delivered(), 4);
        assert_eq!(broadcaster.failures(), 0);
    }

    #[test]
    fn test_deliver_without_consumers_drops_batch() {
        let broadcaster: Broadcaster<&'static str, u32> = Broadcaster::new("k");
        broadcaster.deliver(&[1, 2, 3]);
        assert_eq!(broadcaster.delivered(), 0);
    }

    #[test]
    fn test_closed_broadcaster_drops_batches() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<&'static str, u32> = Broadcaster::new("k");
        broadcaster.subscribe(recorder("a", &log));

        broadcaster.deliver(&[1]);
        broadcaster.close();
        broadcaster.close();
        broadcaster.deliver(&[2, 3]);

        assert!(broadcaster.is_closed());
        assert_eq!(*log.lock().unwrap(), vec![("a", 1)]);
        assert_eq!(broadcaster.delivered(), 1);
    }

    #[test]
    fn test_failing_consumer_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let broadcaster: Broadcaster<&'static str, u32> = Broadcaster::new("k");
        broadcaster.subscribe(Arc::new(Failing));
        broadcaster.subscribe(Arc::new(Panicking));
        broadcaster.subscribe(recorder("ok", &log));

        broadcaster.deliver(&[1, 2, 3]);
        broadcaster.deliver(&[4]);

        assert_eq!(
            *log.lock().unwrap(),
            vec![("ok", 1), ("ok", 2), ("ok", 3), ("ok", 4)]
        );
        assert_eq!(broadcaster.delivered(), 4);
        assert_eq!(broadcaster.failures(), 8);
        // Failing consumers stay registered
        assert_eq!(broadcaster.consumer_count(), 3);
    }

    #[test]
    fn test_subscribe_from_inside_consume() {
        let broadcaster: Arc<Broadcaster<&'static str, u32>> = Arc::new(Broadcaster::new("k"));
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&broadcaster);
        let late = recorder("late", &log);
        broadcaster.subscribe(consumer_fn(move |_: &&'static str, value: &u32| {
            if *value == 1 {
                inner.subscribe(late.clone());
            }
            Ok(())
        }));

        broadcaster.deliver(&[1, 2]);
        assert!(log.lock().unwrap().is_empty());

        broadcaster.deliver(&[3]);
        assert_eq!(*log.lock().unwrap(), vec![("late", 3)]);
    }
}
