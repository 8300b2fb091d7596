//! Process-scoped owner of the event and wrapper pools
//!
//! The service is built and torn down explicitly by whoever owns the tick
//! loop; there is no global instance. Clone the `Arc` handles from
//! [`PoolService::events`] and [`PoolService::wrappers`] to hand pools to
//! background threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::registry::EventPool;
use super::wrapper_pool::WrapperPool;
use crate::core::config::{ConfigError, PoolConfig};

/// Lifecycle wrapper around [`EventPool`] and [`WrapperPool`]
pub struct PoolService {
    config: PoolConfig,
    events: Arc<EventPool>,
    wrappers: Arc<WrapperPool>,
    initialized: AtomicBool,
}

impl PoolService {
    /// Create the service; pools are usable before `initialize`
    pub fn new(config: PoolConfig) -> Self {
        Self {
            events: Arc::new(EventPool::new(config.clone())),
            wrappers: Arc::new(WrapperPool::new(config.clone())),
            config,
            initialized: AtomicBool::new(false),
        }
    }

    /// Validate configuration and mark the service running
    ///
    /// Calling it again while running does nothing.
    pub fn initialize(&self) -> Result<(), ConfigError> {
        self.config.validate().map_err(ConfigError::Invalid)?;

        if self.initialized.swap(true, Ordering::AcqRel) {
            log::debug!("Pool service already initialized");
            return Ok(());
        }

        log::info!(
            "Pool service initialized (default cap {}, pre-warm {})",
            self.config.default_max_pool_size,
            self.config.prewarm_count
        );
        Ok(())
    }

    /// Log final statistics and drop every pooled instance
    pub fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }

        for (kind, stats) in self.events.all_stats() {
            log::info!(
                "Event pool {}: created {}, retrieved {}, discarded {}, hit rate {:.2}",
                kind,
                stats.total_created,
                stats.total_retrieved,
                stats.total_discarded,
                stats.hit_rate
            );
        }
        for (kind, stats) in self.wrappers.all_stats() {
            log::info!(
                "Wrapper pool {}: created {}, retrieved {}, discarded {}, hit rate {:.2}",
                kind,
                stats.total_created,
                stats.total_retrieved,
                stats.total_discarded,
                stats.hit_rate
            );
        }

        let dropped = self.events.clear_all() + self.wrappers.clear_all();
        log::info!("Pool service shut down, released {} pooled instances", dropped);
    }

    /// Whether `initialize` has run without a matching `shutdown`
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Pools keyed by event kind
    pub fn events(&self) -> &Arc<EventPool> {
        &self.events
    }

    /// Pools keyed by payload kind
    pub fn wrappers(&self) -> &Arc<WrapperPool> {
        &self.wrappers
    }

    /// Configuration the service was built with
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Default for PoolService {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Drop for PoolService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::TestEvent;

    #[test]
    fn test_lifecycle() {
        let service = PoolService::default();
        assert!(!service.is_initialized());

        service.initialize().unwrap();
        service.initialize().unwrap();
        assert!(service.is_initialized());

        service.events().prewarm::<TestEvent>(3);
        service.wrappers().prewarm::<u32>(2);

        service.shutdown();
        assert!(!service.is_initialized());
        assert_eq!(service.events().stats::<TestEvent>().unwrap().current_pool_size, 0);
        assert_eq!(service.wrappers().stats::<u32>().unwrap().current_pool_size, 0);
    }

    #[test]
    fn test_invalid_config_refuses_to_start() {
        let config = PoolConfig::new()
            .with_default_max_pool_size(1)
            .with_prewarm_count(2);
        let service = PoolService::new(config);

        assert!(matches!(service.initialize(), Err(ConfigError::Invalid(_))));
        assert!(!service.is_initialized());
    }

    #[test]
    fn test_handles_outlive_shutdown() {
        let service = PoolService::default();
        service.initialize().unwrap();
        let events = Arc::clone(service.events());
        drop(service);

        let event: TestEvent = events.get();
        assert!(events.release(event));
    }
}
