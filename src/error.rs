//! Error types

use std::any::Any;

use tokio::task::JoinError;

/// Error type for producer-facing operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The key's queue was stopped; the value was not buffered
    #[error("queue is stopped")]
    QueueStopped,

    /// The key's queue already holds `limit` pending values
    #[error("queue is full ({limit} pending values)")]
    QueueFull { limit: usize },

    /// Dispatch workers still running when the shutdown deadline passed
    #[error("shutdown timed out with {pending} dispatch workers still running")]
    ShutdownTimeout { pending: usize },
}

/// Result alias for producer-facing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a consumer.
///
/// Logged and counted by the broadcaster, never returned to a producer.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single dispatch cycle
///
/// Consumer calls are isolated individually, so this only covers panics that
/// escape them, e.g. from a key's `Debug` impl while a failure is logged.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Delivery panicked outside of any consumer call
    #[error("delivery panicked: {0}")]
    Panicked(String),

    /// The blocking delivery task could not be joined
    #[error("delivery task failed: {0}")]
    Join(String),
}

impl From<JoinError> for DispatchError {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            DispatchError::Panicked(panic_message(e.into_panic().as_ref()))
        } else {
            DispatchError::Join(e.to_string())
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::QueueStopped.to_string(), "queue is stopped");
        assert_eq!(
            Error::QueueFull { limit: 8 }.to_string(),
            "queue is full (8 pending values)"
        );
        assert_eq!(
            Error::ShutdownTimeout { pending: 2 }.to_string(),
            "shutdown timed out with 2 dispatch workers still running"
        );
    }

    #[tokio::test]
    async fn test_dispatch_error_from_panicked_task() {
        let e = tokio::task::spawn_blocking(|| panic!("delivery exploded"))
            .await
            .unwrap_err();

        let failure = DispatchError::from(e);
        assert!(matches!(failure, DispatchError::Panicked(ref msg) if msg == "delivery exploded"));
        assert_eq!(failure.to_string(), "delivery panicked: delivery exploded");
    }

    #[tokio::test]
    async fn test_dispatch_error_from_cancelled_task() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        let e = handle.await.unwrap_err();

        assert!(matches!(DispatchError::from(e), DispatchError::Join(_)));
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
