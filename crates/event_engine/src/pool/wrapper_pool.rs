//! Pools of [`EventWrapper`] instances, one per payload kind

use std::collections::HashMap;
use std::sync::Arc;

use super::object_pool::{ObjectPool, PoolStats};
use super::registry::PoolRegistry;
use crate::core::config::PoolConfig;
use crate::events::{EventKind, EventWrapper};

/// Wrapper pools addressed by payload type `T`
///
/// Same contract as [`crate::pool::EventPool`]; stats and `clear_all` cover
/// every payload kind ever pooled.
pub struct WrapperPool {
    registry: PoolRegistry,
}

impl WrapperPool {
    /// Create an empty set of wrapper pools
    pub fn new(config: PoolConfig) -> Self {
        Self {
            registry: PoolRegistry::new(config),
        }
    }

    /// Create the pool for payload `T` with an explicit cap
    pub fn register<T: Send + 'static>(&self, max_pool_size: usize) -> bool {
        self.registry
            .register::<EventWrapper<T>>(EventKind::of::<T>(), max_pool_size)
    }

    /// Shared handle to the wrapper pool for payload `T`
    pub fn pool<T: Send + 'static>(&self) -> Arc<ObjectPool<EventWrapper<T>>> {
        self.registry.pool::<EventWrapper<T>>(EventKind::of::<T>())
    }

    /// Acquire a wrapper carrying `payload`
    pub fn get<T: Send + 'static>(
        &self,
        payload: T,
        source: Option<&'static str>,
        priority: i32,
        immediate: bool,
    ) -> EventWrapper<T> {
        let mut wrapper = self.pool::<T>().get();
        wrapper.fill(payload, source, priority, immediate);
        wrapper
    }

    /// Return a wrapper; its payload is dropped by the reset
    pub fn release<T: Send + 'static>(&self, wrapper: EventWrapper<T>) -> bool {
        self.pool::<T>().release(wrapper)
    }

    /// Construct and store `count` empty wrappers for payload `T`
    pub fn prewarm<T: Send + 'static>(&self, count: usize) -> usize {
        self.pool::<T>().prewarm(count)
    }

    /// Drop every retained wrapper for payload `T`
    pub fn clear_pool<T: Send + 'static>(&self) -> usize {
        self.registry.clear(EventKind::of::<T>())
    }

    /// Drop every retained wrapper of every payload kind
    pub fn clear_all(&self) -> usize {
        self.registry.clear_all()
    }

    /// Counters for payload `T`, `None` if it was never pooled
    pub fn stats<T: Send + 'static>(&self) -> Option<PoolStats> {
        self.registry.stats(EventKind::of::<T>())
    }

    /// Counters keyed by payload kind
    pub fn all_stats(&self) -> HashMap<EventKind, PoolStats> {
        self.registry.all_stats()
    }
}

impl Default for WrapperPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
