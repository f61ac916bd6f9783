//! Registry configuration

use std::time::Duration;

use tokio::runtime::Handle;

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum pending values per key (0 = unlimited)
    ///
    /// A key with no subscriber accumulates every value enqueued for it.
    /// Setting a limit makes `enqueue` fail with `QueueFull` instead.
    pub max_pending: usize,

    /// How long `Registry::shutdown` waits for dispatch workers to flush
    pub shutdown_timeout: Duration,

    /// Runtime that dispatch workers are spawned on (None = current runtime)
    pub runtime: Option<Handle>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_pending: 0, // Unlimited
            shutdown_timeout: Duration::from_secs(5),
            runtime: None,
        }
    }
}

impl RegistryConfig {
    /// Set the per-key pending limit
    pub fn max_pending(mut self, limit: usize) -> Self {
        self.max_pending = limit;
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Spawn dispatch workers on the given runtime
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.max_pending, 0);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert!(config.runtime.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .max_pending(1024)
            .shutdown_timeout(Duration::from_millis(250));

        assert_eq!(config.max_pending, 1024);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_builder_runtime() {
        let config = RegistryConfig::default().runtime(Handle::current());

        assert!(config.runtime.is_some());
    }
}
