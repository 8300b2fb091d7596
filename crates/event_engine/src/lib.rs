//! # Event Engine
//!
//! The performance core of an in-process event dispatch layer for tick-driven
//! simulations.
//!
//! ## Features
//!
//! - **Priority Event Queue**: binary max-heap with handle-based O(log n) removal
//! - **Event Pools**: lock-free per-kind reuse stores with hit-rate statistics
//! - **Wrapper Pools**: pooled generic payload wrappers keyed by payload type
//! - **Batch Processor**: per-kind accumulators flushed by size or age
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use event_engine::prelude::*;
//!
//! let service = PoolService::new(PoolConfig::default());
//! service.initialize()?;
//!
//! let mut queue: PriorityEventQueue<EventWrapper<&'static str>> =
//!     PriorityEventQueue::new(QueueConfig::default());
//! let wrappers = service.wrappers();
//!
//! queue.enqueue(wrappers.get("spawn", Some("director"), 5, false))?;
//! queue.enqueue(wrappers.get("despawn", None, 1, false))?;
//!
//! // Once per tick
//! queue.process_batch(
//!     |event| {
//!         log::info!("handling {:?}", event.payload());
//!         wrappers.release(event);
//!         Ok(())
//!     },
//!     64,
//! );
//!
//! service.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

pub mod events;
pub mod pool;

/// Common imports for event core users
pub mod prelude {
    pub use crate::{
        core::config::{BatchConfig, Config, ConfigError, DispatchConfig, PoolConfig, QueueConfig},
        events::{
            BatchProcessor, BatchStats, Event, EventBase, EventError, EventHandle, EventKind,
            EventWrapper, PriorityEventQueue, QueueError, QueueStats,
        },
        foundation::time::{Clock, ManualClock, Stopwatch, SystemClock, Timer},
        pool::{EventPool, ObjectPool, PoolService, PoolStats, Poolable, WrapperPool},
    };
}
