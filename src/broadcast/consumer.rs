//! Consumer capability
//!
//! A consumer is invoked once per value for every key it is subscribed to.
//! It may be shared across keys, so it must tolerate concurrent calls from
//! different dispatch workers.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::ConsumerError;

/// Receives values published under a key
pub trait Consumer<K, V>: Send + Sync {
    /// Handle one value
    ///
    /// Returning an error (or panicking) is logged and skipped; the value is
    /// not retried and the consumer stays subscribed.
    fn consume(&self, key: &K, value: &V) -> Result<(), ConsumerError>;

    /// Name used in log output
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Consumer backed by a closure, see [`consumer_fn`]
pub struct FnConsumer<F, K, V> {
    f: F,
    _marker: PhantomData<fn(&K, &V)>,
}

impl<F, K, V> Consumer<K, V> for FnConsumer<F, K, V>
where
    F: Fn(&K, &V) -> Result<(), ConsumerError> + Send + Sync,
{
    fn consume(&self, key: &K, value: &V) -> Result<(), ConsumerError> {
        (self.f)(key, value)
    }

    fn name(&self) -> &str {
        "fn_consumer"
    }
}

impl<F, K, V> fmt::Debug for FnConsumer<F, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConsumer").finish_non_exhaustive()
    }
}

/// Wrap a closure as a shareable consumer handle
///
/// # Example
/// ```
/// use keyed_mux::consumer_fn;
///
/// let printer = consumer_fn(|key: &u32, value: &String| {
///     println!("{key}: {value}");
///     Ok(())
/// });
/// # let _ = printer;
/// ```
pub fn consumer_fn<K, V, F>(f: F) -> Arc<dyn Consumer<K, V>>
where
    F: Fn(&K, &V) -> Result<(), ConsumerError> + Send + Sync + 'static,
    K: 'static,
    V: 'static,
{
    Arc::new(FnConsumer {
        f,
        _marker: PhantomData,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Named;

    impl Consumer<u8, u8> for Named {
        fn consume(&self, _key: &u8, _value: &u8) -> Result<(), ConsumerError> {
            Ok(())
        }
    }

    #[test]
    fn test_consumer_fn_invokes_closure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in = Arc::clone(&seen);
        let consumer = consumer_fn(move |key: &u32, value: &u32| {
            seen_in.fetch_add((*key + *value) as usize, Ordering::SeqCst);
            Ok(())
        });

        consumer.consume(&1, &2).unwrap();
        consumer.consume(&3, &4).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 10);
        assert_eq!(consumer.name(), "fn_consumer");
    }

    #[test]
    fn test_consumer_fn_propagates_failure() {
        let consumer = consumer_fn(|_: &u32, value: &u32| {
            if *value == 0 {
                Err("zero".into())
            } else {
                Ok(())
            }
        });

        assert!(consumer.consume(&1, &1).is_ok());
        assert_eq!(consumer.consume(&1, &0).unwrap_err().to_string(), "zero");
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Named.name().ends_with("Named"));
    }
}
