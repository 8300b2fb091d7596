//! Event Pooling System
//!
//! Reuses event instances to keep per-tick allocation flat. Pools are keyed
//! by concrete event kind, with a parallel set of pools for generic payload
//! wrappers keyed by payload kind.
//!
//! # Architecture
//!
//! ```text
//! PoolService (initialize / shutdown)
//!         ├── EventPool    (EventKind of K  → ObjectPool<K>)
//!         └── WrapperPool  (EventKind of T  → ObjectPool<EventWrapper<T>>)
//!                     ↓
//!          lock-free SegQueue store + atomic counters
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let service = PoolService::new(PoolConfig::default());
//! service.initialize()?;
//!
//! let event: DamageEvent = service.events().get();
//! // ... enqueue, process ...
//! service.events().release(event);
//!
//! service.shutdown();
//! ```

pub mod object_pool;
pub mod registry;
pub mod service;
pub mod wrapper_pool;

pub use object_pool::{ObjectPool, PoolStats, Poolable};
pub use registry::EventPool;
pub use service::PoolService;
pub use wrapper_pool::WrapperPool;
