//! Background dispatch task
//!
//! One worker runs per active key. Each cycle it drains the key's queue and
//! hands the batch to the key's broadcaster on the blocking pool, so a slow
//! consumer holds up only its own key.
//!
//! Between cycles the worker keeps [`Weak`](std::sync::Weak) references
//! only. The registry owns the queue and the broadcaster; once it lets go of
//! them the next cycle fails to resolve them and the task ends. Within a
//! cycle both are held, so a batch woken by a stop still reaches the
//! consumers that were subscribed when it was enqueued. A stopped queue ends
//! the task after that final batch; a closed broadcaster ends it without
//! delivering.
//!
//! ```text
//!   Running ──► resolve queue + broadcaster ──gone──► Terminated
//!      ▲                   │
//!      │                 drain
//!      │                   ▼
//!      │          broadcaster closed? ──yes──► Terminated
//!      │                   │ no
//!      │                deliver
//!      │                   ▼
//!      └──── no ─── queue stopped? ──yes──► drain rest, deliver, Terminated
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::error::{panic_message, DispatchError};
use crate::queue::Queue;

/// Handle to a running dispatch task
#[derive(Debug)]
pub struct DispatchWorker {
    handle: JoinHandle<()>,
}

impl DispatchWorker {
    /// Start a worker bound to `queue` and `broadcaster`
    pub fn spawn<K, V>(
        runtime: &Handle,
        key: K,
        queue: &Arc<Queue<V>>,
        broadcaster: &Arc<Broadcaster<K, V>>,
    ) -> Self
    where
        K: Debug + Send + Sync + 'static,
        V: Send + 'static,
    {
        let handle = runtime.spawn(run(key, Arc::clone(queue), Arc::clone(broadcaster)));
        Self { handle }
    }

    /// Whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                tracing::error!(
                    error = %panic_message(e.into_panic().as_ref()),
                    "Dispatch worker panicked"
                );
            }
        }
    }
}

/// The first cycle runs on the references passed in, so values enqueued
/// before the task is first polled are not lost to an early `unsubscribe`.
async fn run<K, V>(key: K, queue: Arc<Queue<V>>, broadcaster: Arc<Broadcaster<K, V>>)
where
    K: Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    tracing::debug!(key = ?key, "Dispatch worker started");

    let queue_ref = Arc::downgrade(&queue);
    let broadcaster_ref = Arc::downgrade(&broadcaster);
    let mut bound = Some((queue, broadcaster));

    loop {
        let (queue, broadcaster) = match bound.take() {
            Some(pair) => pair,
            None => match (queue_ref.upgrade(), broadcaster_ref.upgrade()) {
                (Some(queue), Some(broadcaster)) => (queue, broadcaster),
                _ => {
                    tracing::debug!(key = ?key, "Key released, dispatch worker exiting");
                    return;
                }
            },
        };

        loop {
            let (batch, stopped) = queue.drain().await;

            if broadcaster.is_closed() {
                tracing::debug!(
                    key = ?key,
                    discarded = batch.len(),
                    "Broadcaster closed, dispatch worker exiting"
                );
                return;
            }

            deliver(&key, &broadcaster, batch).await;

            if stopped {
                tracing::debug!(key = ?key, "Queue stopped, dispatch worker exiting");
                return;
            }
            // Stopped mid-delivery: the next drain returns the rest at once
            if !queue.is_stopped() {
                break;
            }
        }
    }
}

async fn deliver<K, V>(key: &K, broadcaster: &Arc<Broadcaster<K, V>>, batch: Vec<V>)
where
    K: Debug + Send + Sync + 'static,
    V: Send + 'static,
{
    if batch.is_empty() {
        return;
    }

    let size = batch.len();
    let broadcaster = Arc::clone(broadcaster);
    if let Err(e) = tokio::task::spawn_blocking(move || broadcaster.deliver(&batch)).await {
        let failure = DispatchError::from(e);
        tracing::error!(key = ?key, batch = size, error = %failure, "Dispatch cycle failed");
    }
}
