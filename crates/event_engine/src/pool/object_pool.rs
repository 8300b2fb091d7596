//! Lock-free object pool for a single poolable type

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use serde::Serialize;

use crate::events::Event;

/// An event that can be recycled through an [`ObjectPool`]
///
/// `Default` builds a blank instance on a pool miss or during pre-warming.
pub trait Poolable: Event + Default {
    /// Prepare the instance for a new producer; called on every `get`
    fn initialize(&mut self);

    /// Clear all state so nothing leaks to the next consumer; called before
    /// the instance is stored
    fn reset(&mut self);
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Instances constructed because the pool was empty
    pub total_created: u64,
    /// Instances handed out from the pool
    pub total_retrieved: u64,
    /// Instances dropped on release because the pool was full
    pub total_discarded: u64,
    /// Instances currently retained
    pub current_pool_size: usize,
    /// Cap on retained instances
    pub max_pool_size: usize,
    /// `retrieved / (created + retrieved)`, 0 before the first `get`
    pub hit_rate: f64,
}

/// Bounded reuse store for one type
///
/// Safe to share between threads; every operation takes `&self`. The cap
/// only bounds retained instances, `get` never fails.
pub struct ObjectPool<T: Poolable> {
    store: SegQueue<T>,
    max_pool_size: usize,
    current_size: AtomicUsize,
    total_created: AtomicU64,
    total_retrieved: AtomicU64,
    total_discarded: AtomicU64,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create an empty pool retaining at most `max_pool_size` instances
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            store: SegQueue::new(),
            max_pool_size,
            current_size: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_retrieved: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
        }
    }

    /// Acquire an initialized instance, reusing a pooled one when available
    pub fn get(&self) -> T {
        if let Some(mut item) = self.store.pop() {
            self.current_size.fetch_sub(1, Ordering::AcqRel);
            item.initialize();
            self.total_retrieved.fetch_add(1, Ordering::Relaxed);
            return item;
        }

        let mut item = T::default();
        item.initialize();
        self.total_created.fetch_add(1, Ordering::Relaxed);
        item
    }

    /// Hand an instance back
    ///
    /// Returns `true` when the instance was retained. Non-poolable and
    /// disposed instances are dropped, as is anything released into a full
    /// pool.
    pub fn release(&self, mut item: T) -> bool {
        if !item.is_poolable() {
            log::trace!("Dropping non-poolable {}", std::any::type_name::<T>());
            return false;
        }
        if item.is_disposed() {
            log::debug!("Refusing to pool disposed {}", std::any::type_name::<T>());
            return false;
        }
        if !self.reserve_slot() {
            self.total_discarded.fetch_add(1, Ordering::Relaxed);
            log::debug!(
                "Pool for {} is full ({}), discarding instance",
                std::any::type_name::<T>(),
                self.max_pool_size
            );
            return false;
        }

        item.reset();
        self.store.push(item);
        true
    }

    /// Construct and store up to `count` reset instances
    ///
    /// Stops early at the pool cap. Returns how many were stored.
    pub fn prewarm(&self, count: usize) -> usize {
        let mut stored = 0;
        while stored < count && self.reserve_slot() {
            let mut item = T::default();
            item.reset();
            self.store.push(item);
            stored += 1;
        }
        log::debug!("Pre-warmed {} x {}", stored, std::any::type_name::<T>());
        stored
    }

    /// Drop every retained instance; counters are kept
    pub fn clear(&self) -> usize {
        let mut dropped = 0;
        while self.store.pop().is_some() {
            self.current_size.fetch_sub(1, Ordering::AcqRel);
            dropped += 1;
        }
        dropped
    }

    /// Number of retained instances
    pub fn len(&self) -> usize {
        self.current_size.load(Ordering::Acquire)
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cap on retained instances
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Snapshot of the counters
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> PoolStats {
        let total_created = self.total_created.load(Ordering::Relaxed);
        let total_retrieved = self.total_retrieved.load(Ordering::Relaxed);
        let acquisitions = total_created + total_retrieved;

        PoolStats {
            total_created,
            total_retrieved,
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            current_pool_size: self.len(),
            max_pool_size: self.max_pool_size,
            hit_rate: if acquisitions == 0 {
                0.0
            } else {
                total_retrieved as f64 / acquisitions as f64
            },
        }
    }

    // Claims room for one instance so concurrent releases never overshoot
    // the cap.
    fn reserve_slot(&self) -> bool {
        self.current_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                (size < self.max_pool_size).then_some(size + 1)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::TestEvent;
    use crate::events::EventBase;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_prewarmed_pool_hits() {
        let pool = ObjectPool::<TestEvent>::new(100);
        assert_eq!(pool.prewarm(10), 10);

        let items: Vec<_> = (0..10).map(|_| pool.get()).collect();
        assert!(items.iter().all(|item| item.initialized == 1));

        let stats = pool.stats();
        assert_eq!(stats.total_retrieved, 10);
        assert_eq!(stats.total_created, 0);
        assert_eq!(stats.current_pool_size, 0);
        assert!((stats.hit_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_miss_constructs_new_instance() {
        let pool = ObjectPool::<TestEvent>::new(4);
        let item = pool.get();
        assert_eq!(item.initialized, 1);

        let stats = pool.stats();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.total_retrieved, 0);
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_overflow_is_discarded() {
        let pool = ObjectPool::<TestEvent>::new(2);
        assert!(pool.release(TestEvent::new(1)));
        assert!(pool.release(TestEvent::new(2)));
        assert!(!pool.release(TestEvent::new(3)));

        let stats = pool.stats();
        assert_eq!(stats.current_pool_size, 2);
        assert_eq!(stats.total_discarded, 1);
        assert_eq!(pool.prewarm(5), 0);
    }

    #[test]
    fn test_release_resets_state() {
        let pool = ObjectPool::<TestEvent>::new(2);
        pool.release(TestEvent::tagged(9, 77));

        let item = pool.get();
        assert_eq!(item.tag, 0);
        assert_eq!(item.priority(), 0);
        assert!(!item.is_disposed());
    }

    #[test]
    fn test_non_poolable_and_disposed_are_dropped() {
        let pool = ObjectPool::<TestEvent>::new(8);

        let unpooled = TestEvent {
            base: EventBase::unpooled(1),
            ..TestEvent::default()
        };
        assert!(!pool.release(unpooled));

        let mut disposed = TestEvent::new(1);
        disposed.dispose();
        assert!(!pool.release(disposed));

        assert!(pool.is_empty());
        assert_eq!(pool.stats().total_discarded, 0);
    }

    #[test]
    fn test_clear_empties_store() {
        let pool = ObjectPool::<TestEvent>::new(8);
        pool.prewarm(5);
        assert_eq!(pool.clear(), 5);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_release_respects_cap() {
        let pool = Arc::new(ObjectPool::<TestEvent>::new(16));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    for _ in 0..100 {
                        let item = pool.get();
                        pool.release(item);
                        pool.release(TestEvent::new(1));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let stats = pool.stats();
        assert!(stats.current_pool_size <= 16);
        assert_eq!(stats.current_pool_size, pool.store.len());
        assert_eq!(stats.total_created + stats.total_retrieved, 400);
    }
}
