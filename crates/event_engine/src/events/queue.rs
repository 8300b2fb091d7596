//! # Priority Event Queue
//!
//! Array-backed binary max-heap over pending events with an identity→index
//! map, so any pending event can be removed in O(log n) without a scan.
//!
//! ## Invariants
//!
//! - `heap[i].priority >= heap[2i + 1].priority` and `>= heap[2i + 2].priority`
//! - `indices[heap[i].handle] == i` for every pending event
//! - `indices.len() == heap.len()` between operations
//!
//! Equal priorities leave the queue in no particular order; the heap is not
//! stable. Callers wanting FIFO within a priority must fold a sequence number
//! into the priority itself.
//!
//! ## Draining
//!
//! [`PriorityEventQueue::process_batch`] first dequeues into a scratch buffer
//! and only then runs the handler, so whatever the handler queues up for the
//! next tick never interleaves with the batch being processed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::{invoke_isolated, Event, EventError};
use crate::core::config::QueueConfig;
use crate::foundation::time::{Clock, Stopwatch, SystemClock};

/// Identity of a pending event, issued by [`PriorityEventQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(u64);

impl EventHandle {
    /// Raw sequence number
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Reasons an event is refused by the queue
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The event was disposed or failed its validity check
    #[error("event is disposed or invalid")]
    InvalidEvent,

    /// The queue is at its capacity ceiling
    #[error("queue is at capacity ({capacity} events)")]
    CapacityExceeded {
        /// Configured ceiling
        capacity: usize,
    },
}

/// Snapshot of queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueStats {
    /// Events currently pending
    pub current_size: usize,
    /// Largest number of events ever pending at once
    pub peak_size: usize,
    /// Events removed through `dequeue` over the queue's lifetime
    pub total_processed: u64,
    /// Wall time of the last `process_batch` call in milliseconds
    pub last_process_time_ms: f64,
    /// Configured capacity ceiling
    pub capacity: usize,
}

struct HeapEntry<E> {
    handle: EventHandle,
    priority: i32,
    event: E,
}

/// Max-heap of pending events keyed by priority
pub struct PriorityEventQueue<E: Event> {
    heap: Vec<HeapEntry<E>>,
    indices: HashMap<EventHandle, usize>,
    scratch: Vec<E>,
    next_handle: u64,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    peak_size: usize,
    total_processed: u64,
    last_process_time_ms: f64,
}

impl<E: Event> PriorityEventQueue<E> {
    /// Create a queue on the system clock
    pub fn new(config: QueueConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a queue timing its drains with the given clock
    ///
    /// Out-of-range limits are replaced with the defaults.
    pub fn with_clock(config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.sanitized();
        // Do not trust the capacity for preallocation, it may be huge.
        let initial = config.max_capacity.min(1024);
        Self {
            heap: Vec::with_capacity(initial),
            indices: HashMap::with_capacity(initial),
            scratch: Vec::with_capacity(config.max_batch_size.min(1024)),
            next_handle: 0,
            config,
            clock,
            peak_size: 0,
            total_processed: 0,
            last_process_time_ms: 0.0,
        }
    }

    /// Add an event, returning the handle that identifies it while pending
    ///
    /// Invalid events and enqueues beyond the capacity ceiling are logged and
    /// refused; the queue is left untouched and the event is dropped.
    pub fn enqueue(&mut self, event: E) -> Result<EventHandle, QueueError> {
        if !event.is_valid() {
            log::error!(
                "Rejected enqueue of invalid event (priority {}, disposed: {})",
                event.priority(),
                event.is_disposed()
            );
            return Err(QueueError::InvalidEvent);
        }

        if self.heap.len() >= self.config.max_capacity {
            log::warn!(
                "Event queue at capacity ({}), rejecting event with priority {}",
                self.config.max_capacity,
                event.priority()
            );
            return Err(QueueError::CapacityExceeded {
                capacity: self.config.max_capacity,
            });
        }

        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;

        let index = self.heap.len();
        self.heap.push(HeapEntry {
            handle,
            priority: event.priority(),
            event,
        });
        self.indices.insert(handle, index);
        self.bubble_up(index);

        self.peak_size = self.peak_size.max(self.heap.len());
        log::trace!("Enqueued event {:?} ({} pending)", handle, self.heap.len());
        Ok(handle)
    }

    /// Remove and return the highest-priority event
    pub fn dequeue(&mut self) -> Option<E> {
        let last = self.heap.pop()?;

        let root = if self.heap.is_empty() {
            last
        } else {
            let root = std::mem::replace(&mut self.heap[0], last);
            self.indices.insert(self.heap[0].handle, 0);
            self.bubble_down(0);
            root
        };

        self.indices.remove(&root.handle);
        self.total_processed += 1;
        Some(root.event)
    }

    /// Borrow the highest-priority event without removing it
    pub fn peek(&self) -> Option<&E> {
        self.heap.first().map(|entry| &entry.event)
    }

    /// Remove a pending event by handle
    ///
    /// Returns `None` when the handle is unknown, i.e. the event was never
    /// enqueued here or has already left the queue.
    pub fn remove(&mut self, handle: EventHandle) -> Option<E> {
        let index = self.indices.remove(&handle)?;

        if index + 1 == self.heap.len() {
            return self.heap.pop().map(|entry| entry.event);
        }

        // swap_remove moves the last entry into the hole.
        let removed = self.heap.swap_remove(index);
        self.indices.insert(self.heap[index].handle, index);

        // The promoted entry can break the heap property in either direction.
        if index > 0 && self.heap[parent(index)].priority < self.heap[index].priority {
            self.bubble_up(index);
        } else {
            self.bubble_down(index);
        }

        Some(removed.event)
    }

    /// Dispose a pending event in place
    ///
    /// The event keeps its slot until a drain reaches it; `process_batch`
    /// then drops it without calling the handler. Returns `false` for
    /// unknown handles.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let Some(&index) = self.indices.get(&handle) else {
            return false;
        };
        self.heap[index].event.dispose();
        true
    }

    /// Whether the handle refers to a pending event
    pub fn contains(&self, handle: EventHandle) -> bool {
        self.indices.contains_key(&handle)
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Configured capacity ceiling
    pub fn capacity(&self) -> usize {
        self.config.max_capacity
    }

    /// Iterate pending events in heap order (not priority order)
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.heap.iter().map(|entry| &entry.event)
    }

    /// Drop every pending event; statistics are kept
    pub fn clear(&mut self) {
        let dropped = self.heap.len();
        self.heap.clear();
        self.indices.clear();
        if dropped > 0 {
            log::debug!("Cleared {} pending events", dropped);
        }
    }

    /// Drain up to `max_events` events in priority order and hand each one to
    /// `handler`
    ///
    /// The limit is further capped by the configured batch size. Invalid
    /// events found while draining are dropped without counting against the
    /// limit. A handler error or panic is logged and does not stop the rest
    /// of the batch. Returns the number of successful handler calls.
    pub fn process_batch<F>(&mut self, mut handler: F, max_events: usize) -> usize
    where
        F: FnMut(E) -> Result<(), EventError>,
    {
        let stopwatch = Stopwatch::start_new(Arc::clone(&self.clock));
        let limit = max_events.min(self.config.max_batch_size);

        let mut batch = std::mem::take(&mut self.scratch);
        while batch.len() < limit {
            let Some(event) = self.dequeue() else {
                break;
            };
            if event.is_valid() {
                batch.push(event);
            } else {
                log::debug!("Skipping invalid event (priority {}) during drain", event.priority());
            }
        }

        let mut processed = 0;
        for event in batch.drain(..) {
            let priority = event.priority();
            match invoke_isolated(|| handler(event)) {
                Ok(()) => processed += 1,
                Err(err) => {
                    log::error!("Event handler failed for priority {} event: {}", priority, err);
                }
            }
        }
        self.scratch = batch;

        self.last_process_time_ms = stopwatch.elapsed_millis();
        processed
    }

    /// Snapshot of the queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            current_size: self.heap.len(),
            peak_size: self.peak_size,
            total_processed: self.total_processed,
            last_process_time_ms: self.last_process_time_ms,
            capacity: self.config.max_capacity,
        }
    }

    /// Check the heap property and the identity map
    ///
    /// Intended for tests and debug tooling; O(n).
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() != self.heap.len() {
            return Err(format!(
                "index map has {} entries for {} events",
                self.indices.len(),
                self.heap.len()
            ));
        }

        for (index, entry) in self.heap.iter().enumerate() {
            match self.indices.get(&entry.handle) {
                Some(&mapped) if mapped == index => {}
                other => {
                    return Err(format!(
                        "event {:?} at index {} is mapped to {:?}",
                        entry.handle, index, other
                    ))
                }
            }
            if index > 0 && self.heap[parent(index)].priority < entry.priority {
                return Err(format!("heap order violated at index {}", index));
            }
        }

        Ok(())
    }

    fn bubble_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent_index = parent(index);
            if self.heap[parent_index].priority >= self.heap[index].priority {
                break;
            }
            self.swap(index, parent_index);
            index = parent_index;
        }
    }

    fn bubble_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;

            if left < len && self.heap[left].priority > self.heap[largest].priority {
                largest = left;
            }
            if right < len && self.heap[right].priority > self.heap[largest].priority {
                largest = right;
            }
            if largest == index {
                break;
            }

            self.swap(index, largest);
            index = largest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.indices.insert(self.heap[a].handle, a);
        self.indices.insert(self.heap[b].handle, b);
    }
}

impl<E: Event> Default for PriorityEventQueue<E> {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

const fn parent(index: usize) -> usize {
    (index - 1) / 2
}
