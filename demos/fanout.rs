//! Fan-out demo
//!
//! Run with: cargo run --example fanout
//!
//! Spawns a producer thread that publishes frames round-robin over a set of
//! channels. Every channel has a byte counter; channel 0 also has a consumer
//! that rejects oversized frames, to show failures staying contained.
//!
//! Set `RUST_LOG=keyed_mux=debug` to watch sinks and workers come and go.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use keyed_mux::{consumer_fn, Consumer, ConsumerError, Registry};
use tracing_subscriber::EnvFilter;

const CHANNELS: u32 = 8;
const FRAMES: u32 = 20_000;

/// Counts frames and bytes for one channel
#[derive(Default)]
struct ByteCounter {
    frames: AtomicU64,
    bytes: AtomicU64,
}

impl Consumer<u32, Bytes> for ByteCounter {
    fn consume(&self, _channel: &u32, frame: &Bytes) -> Result<(), ConsumerError> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "byte_counter"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyed_mux=info")),
        )
        .init();

    let registry: Arc<Registry<u32, Bytes>> = Arc::new(Registry::new());

    let counters: Vec<Arc<ByteCounter>> = (0..CHANNELS).map(|_| Arc::default()).collect();
    for (channel, counter) in (0..CHANNELS).zip(&counters) {
        registry.subscribe(&channel, counter.clone());
    }

    registry.subscribe(
        &0,
        consumer_fn(|channel: &u32, frame: &Bytes| {
            if frame.len() > 1024 {
                return Err(format!("frame of {} bytes on channel {channel}", frame.len()).into());
            }
            Ok(())
        }),
    );

    let producer = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || -> keyed_mux::Result<()> {
            // One allocation, shared by every frame
            let payload = Bytes::from(vec![0u8; 4096]);
            for i in 0..FRAMES {
                let len = if i % 1000 == 0 { 4096 } else { 188 };
                registry.enqueue(&(i % CHANNELS), payload.slice(..len))?;
            }
            Ok(())
        })
    };

    tokio::task::spawn_blocking(move || producer.join())
        .await?
        .map_err(|_| "producer panicked")??;

    let stats = registry.stats(&0);

    let registry = Arc::into_inner(registry).ok_or("registry still shared")?;
    registry.shutdown().await?;

    for (channel, counter) in counters.iter().enumerate() {
        println!(
            "channel {channel}: {} frames, {} bytes",
            counter.frames.load(Ordering::Relaxed),
            counter.bytes.load(Ordering::Relaxed)
        );
    }
    if let Some(stats) = stats {
        println!(
            "channel 0 at producer completion: {} pending, {} failures so far",
            stats.pending, stats.failures
        );
    }

    Ok(())
}
