//! Event core: the data contract shared by the queue, the pools and the
//! batch processor.
//!
//! Key principles:
//! - An event is an opaque unit carrying a priority (higher = more urgent)
//! - Containers own pending events exclusively; handlers receive them by value
//! - Disposed events are never enqueued, pooled or dispatched
//! - Cancellation is done by disposing an event before it is processed

pub mod batch;
pub mod queue;
pub mod wrapper;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};

pub use batch::{BatchProcessor, BatchStats, EventBatch};
pub use queue::{EventHandle, PriorityEventQueue, QueueError, QueueStats};
pub use wrapper::EventWrapper;

/// Capability every event kind implements
pub trait Event: Send + 'static {
    /// Dispatch priority, higher values are handled first
    fn priority(&self) -> i32;

    /// Whether the event has been disposed and must not be used again
    fn is_disposed(&self) -> bool;

    /// Whether the instance should go back to a pool after processing
    fn is_poolable(&self) -> bool {
        true
    }

    /// Cheap sanity check run right before dispatch
    fn is_valid(&self) -> bool {
        !self.is_disposed()
    }

    /// Mark the event disposed
    fn dispose(&mut self);
}

impl<E: Event + ?Sized> Event for Box<E> {
    fn priority(&self) -> i32 {
        (**self).priority()
    }

    fn is_disposed(&self) -> bool {
        (**self).is_disposed()
    }

    fn is_poolable(&self) -> bool {
        (**self).is_poolable()
    }

    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn dispose(&mut self) {
        (**self).dispose();
    }
}

/// Type discriminator used to key pools and batches
///
/// Resolved once per generic call site; comparisons only look at the
/// `TypeId`, the name is kept for logs and statistics.
#[derive(Clone, Copy)]
pub struct EventKind {
    id: TypeId,
    name: &'static str,
}

impl EventKind {
    /// Discriminator for the concrete type `K`
    pub fn of<K: Any>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: std::any::type_name::<K>(),
        }
    }

    /// Full type name of the kind
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKind {}

impl Hash for EventKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventKind({})", self.name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// State shared by every concrete event kind
///
/// Concrete kinds embed this and forward the [`Event`] methods to it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBase {
    /// Dispatch priority
    pub priority: i32,
    /// Timestamp when the event was produced (seconds)
    pub timestamp: f64,
    disposed: bool,
    poolable: bool,
}

impl EventBase {
    /// Create base state with the given priority
    pub fn new(priority: i32) -> Self {
        Self {
            priority,
            timestamp: 0.0,
            disposed: false,
            poolable: true,
        }
    }

    /// Base state for an instance that must never be pooled
    pub fn unpooled(priority: i32) -> Self {
        Self {
            poolable: false,
            ..Self::new(priority)
        }
    }

    /// Set the timestamp (builder pattern)
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether the owning event has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether the owning event may be pooled
    pub fn is_poolable(&self) -> bool {
        self.poolable
    }

    /// Mark disposed
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    /// Prepare for a new producer after leaving a pool
    pub fn initialize(&mut self) {
        self.disposed = false;
    }

    /// Clear transient state before entering a pool
    pub fn reset(&mut self) {
        self.priority = 0;
        self.timestamp = 0.0;
        self.disposed = false;
    }
}

impl Default for EventBase {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Failure reported by a handler or batch processor
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The callback returned an error
    #[error("handler failed: {0}")]
    Failed(String),

    /// The callback panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl EventError {
    /// Convenience constructor for handler failures
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Panicked(message)
    }
}

/// Run a caller callback so neither an error nor a panic escapes
pub(crate) fn invoke_isolated<F>(callback: F) -> Result<(), EventError>
where
    F: FnOnce() -> Result<(), EventError>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(result) => result,
        Err(payload) => Err(EventError::from_panic(payload.as_ref())),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Small event kinds shared by the unit tests

    use super::{Event, EventBase};
    use crate::pool::Poolable;

    /// Minimal poolable event
    #[derive(Debug, Default)]
    pub struct TestEvent {
        pub base: EventBase,
        pub tag: u32,
        pub initialized: u32,
    }

    impl TestEvent {
        pub fn new(priority: i32) -> Self {
            Self {
                base: EventBase::new(priority),
                ..Self::default()
            }
        }

        pub fn tagged(priority: i32, tag: u32) -> Self {
            Self {
                tag,
                ..Self::new(priority)
            }
        }
    }

    impl Event for TestEvent {
        fn priority(&self) -> i32 {
            self.base.priority
        }

        fn is_disposed(&self) -> bool {
            self.base.is_disposed()
        }

        fn is_poolable(&self) -> bool {
            self.base.is_poolable()
        }

        fn dispose(&mut self) {
            self.base.dispose();
        }
    }

    impl Poolable for TestEvent {
        fn initialize(&mut self) {
            self.base.initialize();
            self.initialized += 1;
        }

        fn reset(&mut self) {
            self.base.reset();
            self.tag = 0;
        }
    }

    /// Second kind so keyed containers have something to tell apart
    #[derive(Debug, Default)]
    pub struct OtherEvent {
        pub base: EventBase,
    }

    impl Event for OtherEvent {
        fn priority(&self) -> i32 {
            self.base.priority
        }

        fn is_disposed(&self) -> bool {
            self.base.is_disposed()
        }

        fn is_poolable(&self) -> bool {
            self.base.is_poolable()
        }

        fn dispose(&mut self) {
            self.base.dispose();
        }
    }

    impl Poolable for OtherEvent {
        fn initialize(&mut self) {
            self.base.initialize();
        }

        fn reset(&mut self) {
            self.base.reset();
        }
    }
}
