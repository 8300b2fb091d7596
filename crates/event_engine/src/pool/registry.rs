//! Per-kind event pools
//!
//! One independent [`ObjectPool`] (store, counters and cap) per concrete
//! event kind, addressed through [`EventKind`] rather than runtime
//! reflection. The pool for a kind is created on first use; hot loops can
//! hold the `Arc` returned by [`EventPool::pool`] to skip the lookup.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::object_pool::{ObjectPool, PoolStats, Poolable};
use crate::core::config::PoolConfig;
use crate::events::EventKind;

/// Operations that do not need the concrete pooled type
trait ErasedPool: Send + Sync {
    fn clear(&self) -> usize;
    fn stats(&self) -> PoolStats;
}

impl<T: Poolable> ErasedPool for ObjectPool<T> {
    fn clear(&self) -> usize {
        ObjectPool::clear(self)
    }

    fn stats(&self) -> PoolStats {
        ObjectPool::stats(self)
    }
}

struct PoolEntry {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn ErasedPool>,
}

impl PoolEntry {
    fn new<T: Poolable>(pool: Arc<ObjectPool<T>>) -> Self {
        Self {
            typed: pool.clone(),
            erased: pool,
        }
    }
}

/// Registry of pools keyed by [`EventKind`]
///
/// Shared by [`EventPool`] (keyed by the event kind) and
/// [`crate::pool::WrapperPool`] (keyed by the payload kind).
pub(crate) struct PoolRegistry {
    pools: RwLock<HashMap<EventKind, PoolEntry>>,
    config: PoolConfig,
}

impl PoolRegistry {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Create the pool for `key` with an explicit cap and pre-warm it
    ///
    /// Returns `false` if the key already had a pool; the existing pool is
    /// left alone.
    pub(crate) fn register<T: Poolable>(&self, key: EventKind, max_pool_size: usize) -> bool {
        let pool = {
            let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
            if pools.contains_key(&key) {
                log::warn!("Pool for {} already registered, keeping existing cap", key);
                return false;
            }
            let pool = Arc::new(ObjectPool::<T>::new(max_pool_size));
            pools.insert(key, PoolEntry::new(Arc::clone(&pool)));
            pool
        };

        let warmed = pool.prewarm(self.config.prewarm_count.min(max_pool_size));
        log::info!("Registered pool for {} (cap {}, pre-warmed {})", key, max_pool_size, warmed);
        true
    }

    /// Pool for `key`, created with the default cap if missing
    pub(crate) fn pool<T: Poolable>(&self, key: EventKind) -> Arc<ObjectPool<T>> {
        {
            let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(pool) = pools.get(&key).and_then(downcast::<T>) {
                return pool;
            }
        }

        let mut pools = self.pools.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(&key).and_then(downcast::<T>) {
            return pool;
        }
        if pools.contains_key(&key) {
            log::error!(
                "Pool for {} holds a different type than {}, replacing it",
                key,
                std::any::type_name::<T>()
            );
        }

        log::debug!(
            "Creating pool for {} on first use (cap {})",
            key,
            self.config.default_max_pool_size
        );
        let pool = Arc::new(ObjectPool::<T>::new(self.config.default_max_pool_size));
        pools.insert(key, PoolEntry::new(Arc::clone(&pool)));
        pool
    }

    pub(crate) fn clear(&self, key: EventKind) -> usize {
        self.erased(key).map_or(0, |pool| pool.clear())
    }

    pub(crate) fn clear_all(&self) -> usize {
        let pools: Vec<_> = {
            let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
            pools.values().map(|entry| Arc::clone(&entry.erased)).collect()
        };
        pools.iter().map(|pool| pool.clear()).sum()
    }

    pub(crate) fn stats(&self, key: EventKind) -> Option<PoolStats> {
        self.erased(key).map(|pool| pool.stats())
    }

    pub(crate) fn all_stats(&self) -> HashMap<EventKind, PoolStats> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools
            .iter()
            .map(|(key, entry)| (*key, entry.erased.stats()))
            .collect()
    }

    fn erased(&self, key: EventKind) -> Option<Arc<dyn ErasedPool>> {
        let pools = self.pools.read().unwrap_or_else(PoisonError::into_inner);
        pools.get(&key).map(|entry| Arc::clone(&entry.erased))
    }
}

fn downcast<T: Poolable>(entry: &PoolEntry) -> Option<Arc<ObjectPool<T>>> {
    Arc::clone(&entry.typed).downcast::<ObjectPool<T>>().ok()
}

/// Pools for concrete event kinds
///
/// Thread-safe: producers on background threads may release events while the
/// main loop acquires others.
pub struct EventPool {
    registry: PoolRegistry,
}

impl EventPool {
    /// Create an empty set of pools
    pub fn new(config: PoolConfig) -> Self {
        Self {
            registry: PoolRegistry::new(config),
        }
    }

    /// Create the pool for `K` with an explicit cap, pre-warming it by the
    /// configured count
    pub fn register<K: Poolable>(&self, max_pool_size: usize) -> bool {
        self.registry.register::<K>(EventKind::of::<K>(), max_pool_size)
    }

    /// Shared handle to the pool for `K`
    pub fn pool<K: Poolable>(&self) -> Arc<ObjectPool<K>> {
        self.registry.pool::<K>(EventKind::of::<K>())
    }

    /// Acquire an initialized `K`
    pub fn get<K: Poolable>(&self) -> K {
        self.pool::<K>().get()
    }

    /// Return a `K`; see [`ObjectPool::release`]
    pub fn release<K: Poolable>(&self, event: K) -> bool {
        self.pool::<K>().release(event)
    }

    /// Construct and store `count` instances of `K` up front
    pub fn prewarm<K: Poolable>(&self, count: usize) -> usize {
        self.pool::<K>().prewarm(count)
    }

    /// Drop every retained `K`
    pub fn clear_pool<K: Poolable>(&self) -> usize {
        self.registry.clear(EventKind::of::<K>())
    }

    /// Drop every retained instance of every kind
    pub fn clear_all(&self) -> usize {
        self.registry.clear_all()
    }

    /// Counters for `K`, `None` if `K` was never pooled
    pub fn stats<K: Poolable>(&self) -> Option<PoolStats> {
        self.registry.stats(EventKind::of::<K>())
    }

    /// Counters for every kind seen so far
    pub fn all_stats(&self) -> HashMap<EventKind, PoolStats> {
        self.registry.all_stats()
    }

    /// Configuration the pools were created with
    pub fn config(&self) -> &PoolConfig {
        self.registry.config()
    }
}

impl Default for EventPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::{OtherEvent, TestEvent};
    use crate::events::Event;
    use std::thread;

    #[test]
    fn test_kinds_have_independent_pools() {
        let pool = EventPool::default();
        pool.prewarm::<TestEvent>(3);
        pool.release(OtherEvent::default());

        assert_eq!(pool.stats::<TestEvent>().unwrap().current_pool_size, 3);
        assert_eq!(pool.stats::<OtherEvent>().unwrap().current_pool_size, 1);
        assert_eq!(pool.all_stats().len(), 2);

        assert_eq!(pool.clear_pool::<TestEvent>(), 3);
        assert_eq!(pool.stats::<OtherEvent>().unwrap().current_pool_size, 1);
    }

    #[test]
    fn test_hit_rate_after_prewarm() {
        let pool = EventPool::default();
        pool.prewarm::<TestEvent>(10);
        for _ in 0..10 {
            let event: TestEvent = pool.get();
            assert!(event.is_valid());
        }

        let stats = pool.stats::<TestEvent>().unwrap();
        assert_eq!(stats.total_retrieved, 10);
        assert_eq!(stats.total_created, 0);
        assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_register_sets_cap_and_prewarms() {
        let pool = EventPool::new(PoolConfig::new().with_prewarm_count(4));
        assert!(pool.register::<TestEvent>(2));
        assert!(!pool.register::<TestEvent>(50));

        let stats = pool.stats::<TestEvent>().unwrap();
        assert_eq!(stats.max_pool_size, 2);
        assert_eq!(stats.current_pool_size, 2);

        assert!(!pool.release(TestEvent::new(1)));
    }

    #[test]
    fn test_unknown_kind_has_no_stats() {
        let pool = EventPool::default();
        assert!(pool.stats::<TestEvent>().is_none());
        assert_eq!(pool.clear_pool::<TestEvent>(), 0);
    }

    #[test]
    fn test_clear_all_covers_every_kind() {
        let pool = EventPool::default();
        pool.prewarm::<TestEvent>(2);
        pool.prewarm::<OtherEvent>(3);

        assert_eq!(pool.clear_all(), 5);
        assert!(pool
            .all_stats()
            .values()
            .all(|stats| stats.current_pool_size == 0));
    }

    #[test]
    fn test_shared_across_threads() {
        let pool = Arc::new(EventPool::default());
        let loader = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for priority in 0..50 {
                    pool.release(TestEvent::new(priority));
                }
            })
        };
        for _ in 0..50 {
            let event: TestEvent = pool.get();
            pool.release(event);
        }
        loader.join().unwrap();

        let stats = pool.stats::<TestEvent>().unwrap();
        assert_eq!(stats.total_created + stats.total_retrieved, 50);
        assert!(stats.current_pool_size <= 100);
    }
}
