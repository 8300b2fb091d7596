//! # Batch Processor
//!
//! Groups events of the same kind into accumulators that flush as one unit
//! when they are full or old enough.
//!
//! ## Readiness
//!
//! An accumulator is ready when it holds `max_batch_size` events, or when it
//! is non-empty and its first event arrived `max_batch_time` ago. The size
//! threshold bounds memory, the time threshold bounds latency for trickles.
//!
//! ## Processing
//!
//! The accumulated list is taken out of the accumulator before the processor
//! runs, so a batch is drained and cleared in one step from the caller's
//! point of view. After the processor returns (or fails, or panics) every
//! event is released to the attached [`EventPool`], or disposed when no pool
//! is attached or the event is not poolable.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{invoke_isolated, Event, EventError, EventKind};
use crate::core::config::BatchConfig;
use crate::foundation::time::{Clock, SystemClock};
use crate::pool::{EventPool, Poolable};

/// Callback that handles a whole batch of `K`
pub type BatchFn<K> = Box<dyn FnMut(&[K]) -> Result<(), EventError>>;

/// Snapshot of one kind's batching statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatchStats {
    /// Events waiting in the accumulator
    pub current_size: usize,
    /// Events handed to processors over the processor's lifetime
    pub total_processed: u64,
    /// Batches flushed over the processor's lifetime
    pub total_batches: u64,
    /// Age of the oldest waiting event, zero when empty
    pub time_since_first_event: Duration,
    /// `total_processed / total_batches`
    pub avg_events_per_batch: f64,
}

/// Accumulator for a single event kind
pub struct EventBatch<K: Poolable> {
    events: Vec<K>,
    first_event_time: Option<Duration>,
    max_batch_size: usize,
    max_batch_time: Duration,
    processor: BatchFn<K>,
}

impl<K: Poolable> EventBatch<K> {
    /// Create an empty accumulator bound to `processor`
    pub fn new(max_batch_size: usize, max_batch_time: Duration, processor: BatchFn<K>) -> Self {
        Self {
            events: Vec::with_capacity(max_batch_size.min(256)),
            first_event_time: None,
            max_batch_size,
            max_batch_time,
            processor,
        }
    }

    /// Append an event observed at time `now`
    pub fn push(&mut self, event: K, now: Duration) {
        if self.events.is_empty() {
            self.first_event_time = Some(now);
        }
        self.events.push(event);
    }

    /// Whether the size or time threshold has been reached
    pub fn is_ready_for_processing(&self, now: Duration) -> bool {
        if self.events.len() >= self.max_batch_size {
            return true;
        }
        !self.events.is_empty() && self.time_since_first_event(now) >= self.max_batch_time
    }

    /// Age of the oldest waiting event
    pub fn time_since_first_event(&self, now: Duration) -> Duration {
        self.first_event_time
            .map_or(Duration::ZERO, |first| now.saturating_sub(first))
    }

    /// When the accumulator last went from empty to non-empty
    pub fn first_event_time(&self) -> Option<Duration> {
        self.first_event_time
    }

    /// Number of waiting events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Run the processor over everything still valid, then release the events
    ///
    /// Events that became invalid while waiting are recycled without reaching
    /// the processor, and the processor is not called when none are left.
    /// Returns how many events the processor saw and what it reported.
    pub fn process(&mut self, pool: Option<&EventPool>) -> (usize, Result<(), EventError>) {
        let mut events = std::mem::take(&mut self.events);
        self.first_event_time = None;

        let (mut valid, mut invalid): (Vec<K>, Vec<K>) =
            events.drain(..).partition(|event| event.is_valid());
        self.events = events;

        if !invalid.is_empty() {
            log::debug!(
                "Skipping {} invalid {} events during flush",
                invalid.len(),
                EventKind::of::<K>()
            );
            recycle(&mut invalid, pool);
        }
        if valid.is_empty() {
            return (0, Ok(()));
        }

        let processor = &mut self.processor;
        let result = invoke_isolated(|| processor(&valid));

        let count = valid.len();
        recycle(&mut valid, pool);
        (count, result)
    }

    /// Release everything waiting without running the processor
    pub fn discard(&mut self, pool: Option<&EventPool>) -> usize {
        let count = self.events.len();
        recycle(&mut self.events, pool);
        self.first_event_time = None;
        count
    }
}

fn recycle<K: Poolable>(events: &mut Vec<K>, pool: Option<&EventPool>) {
    for mut event in events.drain(..) {
        match pool {
            Some(pool) if event.is_poolable() => {
                pool.release(event);
            }
            _ => event.dispose(),
        }
    }
}

/// Accumulator operations that do not need the concrete kind
trait ErasedBatch {
    fn len(&self) -> usize;
    fn is_ready(&self, now: Duration) -> bool;
    fn time_since_first_event(&self, now: Duration) -> Duration;
    fn process(&mut self, pool: Option<&EventPool>) -> (usize, Result<(), EventError>);
    fn discard(&mut self, pool: Option<&EventPool>) -> usize;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<K: Poolable> ErasedBatch for EventBatch<K> {
    fn len(&self) -> usize {
        EventBatch::len(self)
    }

    fn is_ready(&self, now: Duration) -> bool {
        self.is_ready_for_processing(now)
    }

    fn time_since_first_event(&self, now: Duration) -> Duration {
        EventBatch::time_since_first_event(self, now)
    }

    fn process(&mut self, pool: Option<&EventPool>) -> (usize, Result<(), EventError>) {
        EventBatch::process(self, pool)
    }

    fn discard(&mut self, pool: Option<&EventPool>) -> usize {
        EventBatch::discard(self, pool)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KindTotals {
    events: u64,
    batches: u64,
}

/// Per-kind accumulators driven from the tick loop
///
/// Not thread-safe; owned by the loop that calls
/// [`BatchProcessor::process_ready_batches`].
pub struct BatchProcessor {
    batches: HashMap<EventKind, Box<dyn ErasedBatch>>,
    order: Vec<EventKind>,
    totals: HashMap<EventKind, KindTotals>,
    config: BatchConfig,
    clock: Arc<dyn Clock>,
    pool: Option<Arc<EventPool>>,
    total_batches_processed: u64,
    total_events_processed: u64,
}

impl BatchProcessor {
    /// Create a processor on the system clock
    pub fn new(config: BatchConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a processor reading time from `clock`
    ///
    /// Out-of-range thresholds are replaced with the defaults.
    pub fn with_clock(config: BatchConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            batches: HashMap::new(),
            order: Vec::new(),
            totals: HashMap::new(),
            config: config.sanitized(),
            clock,
            pool: None,
            total_batches_processed: 0,
            total_events_processed: 0,
        }
    }

    /// Release processed events to `pool` instead of disposing them
    pub fn with_pool(mut self, pool: Arc<EventPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Add an event to the accumulator for its kind
    ///
    /// The processor is bound when the accumulator is created; while that
    /// accumulator exists later processors for the same kind are ignored.
    /// Invalid events are logged and dropped, returning `false`.
    pub fn add_to_batch<K, F>(&mut self, event: K, processor: F) -> bool
    where
        K: Poolable,
        F: FnMut(&[K]) -> Result<(), EventError> + 'static,
    {
        let kind = EventKind::of::<K>();
        if !event.is_valid() {
            log::error!("Rejected invalid {} event for batching", kind);
            return false;
        }

        let now = self.clock.now();
        let config = &self.config;
        let order = &mut self.order;
        let batch = self.batches.entry(kind).or_insert_with(|| {
            log::debug!("Opening batch for {}", kind);
            order.push(kind);
            let batch: Box<dyn ErasedBatch> = Box::new(EventBatch::<K>::new(
                config.max_batch_size,
                config.max_batch_time(),
                Box::new(processor),
            ));
            batch
        });

        match batch.as_any_mut().downcast_mut::<EventBatch<K>>() {
            Some(batch) => {
                batch.push(event, now);
                true
            }
            None => {
                log::error!("Batch for {} has an unexpected type, dropping event", kind);
                false
            }
        }
    }

    /// Whether the accumulator for `K` should be flushed now
    pub fn is_ready<K: Poolable>(&self) -> bool {
        let now = self.clock.now();
        self.batches
            .get(&EventKind::of::<K>())
            .is_some_and(|batch| batch.is_ready(now))
    }

    /// Number of events waiting for `K`
    pub fn pending<K: Poolable>(&self) -> usize {
        self.batches
            .get(&EventKind::of::<K>())
            .map_or(0, |batch| batch.len())
    }

    /// Flush every accumulator that meets its size or time threshold
    ///
    /// A processor failure is logged and does not stop other kinds; the
    /// failed batch still counts as processed and its events are still
    /// released. Returns the number of batches flushed.
    pub fn process_ready_batches(&mut self) -> usize {
        let now = self.clock.now();
        let ready: Vec<EventKind> = self
            .order
            .iter()
            .copied()
            .filter(|kind| self.batches.get(kind).is_some_and(|batch| batch.is_ready(now)))
            .collect();

        let mut processed = 0;
        for kind in ready {
            if self.flush(kind) {
                processed += 1;
            }
        }

        // Drained accumulators are dropped so idle kinds do not hold memory.
        self.batches.retain(|_, batch| batch.len() > 0);
        let batches = &self.batches;
        self.order.retain(|kind| batches.contains_key(kind));
        processed
    }

    /// Flush every non-empty accumulator regardless of readiness, then drop
    /// all accumulators
    pub fn process_all_batches(&mut self) -> usize {
        let mut processed = 0;
        for kind in std::mem::take(&mut self.order) {
            if self.flush(kind) {
                processed += 1;
            }
        }
        self.batches.clear();
        processed
    }

    /// Statistics for every kind that has waiting events or has ever been
    /// flushed
    #[allow(clippy::cast_precision_loss)]
    pub fn batch_stats(&self) -> HashMap<EventKind, BatchStats> {
        let now = self.clock.now();
        let mut stats: HashMap<EventKind, BatchStats> = HashMap::new();

        for (kind, totals) in &self.totals {
            stats.insert(
                *kind,
                BatchStats {
                    total_processed: totals.events,
                    total_batches: totals.batches,
                    avg_events_per_batch: if totals.batches == 0 {
                        0.0
                    } else {
                        totals.events as f64 / totals.batches as f64
                    },
                    ..BatchStats::default()
                },
            );
        }
        for (kind, batch) in &self.batches {
            let entry = stats.entry(*kind).or_default();
            entry.current_size = batch.len();
            entry.time_since_first_event = batch.time_since_first_event(now);
        }

        stats
    }

    /// Batches flushed since creation or the last `clear`
    pub fn total_batches_processed(&self) -> u64 {
        self.total_batches_processed
    }

    /// Events handed to processors since creation or the last `clear`
    pub fn total_events_processed(&self) -> u64 {
        self.total_events_processed
    }

    /// Kinds with an open accumulator, in the order they were opened
    pub fn pending_kinds(&self) -> &[EventKind] {
        &self.order
    }

    /// Total events waiting across all kinds
    pub fn pending_events(&self) -> usize {
        self.batches.values().map(|batch| batch.len()).sum()
    }

    /// Drop all accumulators without running processors and reset statistics
    pub fn clear(&mut self) {
        let pool = self.pool.as_deref();
        let discarded: usize = self
            .batches
            .values_mut()
            .map(|batch| batch.discard(pool))
            .sum();
        if discarded > 0 {
            log::debug!("Cleared batch processor, discarded {} pending events", discarded);
        }

        self.batches.clear();
        self.order.clear();
        self.totals.clear();
        self.total_batches_processed = 0;
        self.total_events_processed = 0;
    }

    // Runs one accumulator if it has anything waiting. Returns whether a
    // batch was flushed.
    fn flush(&mut self, kind: EventKind) -> bool {
        let Some(batch) = self.batches.get_mut(&kind) else {
            return false;
        };
        if batch.len() == 0 {
            return false;
        }

        let (count, result) = batch.process(self.pool.as_deref());
        if count == 0 {
            log::trace!("No valid {} events left to flush", kind);
            return false;
        }
        if let Err(err) = result {
            log::error!("Batch processor for {} failed on {} events: {}", kind, count, err);
        }

        let count = count as u64;
        let totals = self.totals.entry(kind).or_default();
        totals.events += count;
        totals.batches += 1;
        self.total_events_processed += count;
        self.total_batches_processed += 1;
        log::trace!("Flushed {} {} events", count, kind);
        true
    }
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_support::{OtherEvent, TestEvent};
    use crate::events::EventBase;
    use crate::foundation::time::ManualClock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Event that stays valid only while its owner keeps the flag raised
    #[derive(Debug, Default)]
    struct Expiring {
        base: EventBase,
        live: Arc<AtomicBool>,
        tag: u32,
    }

    impl Expiring {
        fn new(tag: u32, live: &Arc<AtomicBool>) -> Self {
            Self {
                base: EventBase::new(0),
                live: Arc::clone(live),
                tag,
            }
        }
    }

    impl Event for Expiring {
        fn priority(&self) -> i32 {
            self.base.priority
        }

        fn is_disposed(&self) -> bool {
            self.base.is_disposed()
        }

        fn is_valid(&self) -> bool {
            !self.base.is_disposed() && self.live.load(Ordering::SeqCst)
        }

        fn dispose(&mut self) {
            self.base.dispose();
        }
    }

    impl Poolable for Expiring {
        fn initialize(&mut self) {
            self.base.initialize();
        }

        fn reset(&mut self) {
            self.base.reset();
            self.live = Arc::default();
            self.tag = 0;
        }
    }

    fn processor_with(config: BatchConfig) -> (BatchProcessor, ManualClock) {
        let clock = ManualClock::new();
        let processor = BatchProcessor::with_clock(config, Arc::new(clock.clone()));
        (processor, clock)
    }

    fn recorder() -> (
        Rc<RefCell<Vec<Vec<u32>>>>,
        impl FnMut(&[TestEvent]) -> Result<(), EventError>,
    ) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let processor = move |events: &[TestEvent]| -> Result<(), EventError> {
            sink.borrow_mut().push(events.iter().map(|e| e.tag).collect());
            Ok(())
        };
        (calls, processor)
    }

    #[test]
    fn test_ready_by_size() {
        let (mut processor, _clock) = processor_with(BatchConfig::new().with_max_batch_size(3));

        processor.add_to_batch(TestEvent::tagged(0, 1), |_: &[TestEvent]| Ok(()));
        processor.add_to_batch(TestEvent::tagged(0, 2), |_: &[TestEvent]| Ok(()));
        assert!(!processor.is_ready::<TestEvent>());

        processor.add_to_batch(TestEvent::tagged(0, 3), |_: &[TestEvent]| Ok(()));
        assert!(processor.is_ready::<TestEvent>());
    }

    #[test]
    fn test_ready_by_time() {
        let config = BatchConfig::new()
            .with_max_batch_size(1000)
            .with_max_batch_time_secs(0.1);
        let (mut processor, clock) = processor_with(config);

        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| Ok(()));
        clock.advance_secs(0.05);
        assert!(!processor.is_ready::<TestEvent>());

        clock.advance_secs(0.06);
        assert!(processor.is_ready::<TestEvent>());
    }

    #[test]
    fn test_negative_batch_time_uses_default_threshold() {
        let config = BatchConfig::new().with_max_batch_time_secs(-1.0);
        let (mut processor, clock) = processor_with(config);

        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| Ok(()));
        assert!(!processor.is_ready::<TestEvent>());

        clock.advance_secs(0.02);
        assert!(processor.is_ready::<TestEvent>());
    }

    #[test]
    fn test_first_event_time_set_on_transition_only() {
        let clock = ManualClock::new();
        let mut batch = EventBatch::<TestEvent>::new(
            10,
            Duration::from_secs(1),
            Box::new(|_: &[TestEvent]| -> Result<(), EventError> { Ok(()) }),
        );

        batch.push(TestEvent::new(0), clock.now());
        clock.advance_secs(0.5);
        batch.push(TestEvent::new(0), clock.now());
        assert_eq!(batch.first_event_time(), Some(Duration::ZERO));

        batch.process(None);
        assert!(batch.first_event_time().is_none());
        batch.push(TestEvent::new(0), clock.now());
        assert_eq!(batch.first_event_time(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_process_ready_flushes_only_ready_kinds() {
        let (mut processor, _clock) = processor_with(BatchConfig::new().with_max_batch_size(2));
        let (calls, record) = recorder();

        processor.add_to_batch(TestEvent::tagged(0, 1), record);
        processor.add_to_batch(TestEvent::tagged(0, 2), |_: &[TestEvent]| Ok(()));
        processor.add_to_batch(OtherEvent::default(), |_: &[OtherEvent]| Ok(()));

        assert_eq!(processor.process_ready_batches(), 1);
        assert_eq!(*calls.borrow(), vec![vec![1, 2]]);
        assert_eq!(processor.pending::<TestEvent>(), 0);
        assert_eq!(processor.pending::<OtherEvent>(), 1);
        assert_eq!(processor.pending_kinds(), &[EventKind::of::<OtherEvent>()]);
    }

    #[test]
    fn test_force_flush_runs_processor_once() {
        let (mut processor, _clock) = processor_with(BatchConfig::default());
        let (calls, record) = recorder();

        processor.add_to_batch(TestEvent::tagged(0, 1), record);
        for tag in 2..=4 {
            processor.add_to_batch(TestEvent::tagged(0, tag), |_: &[TestEvent]| Ok(()));
        }
        assert_eq!(processor.process_ready_batches(), 0);

        assert_eq!(processor.process_all_batches(), 1);
        assert_eq!(*calls.borrow(), vec![vec![1, 2, 3, 4]]);
        assert_eq!(processor.pending_events(), 0);
        assert!(processor.pending_kinds().is_empty());
    }

    #[test]
    fn test_failing_processor_does_not_block_other_kinds() {
        let (mut processor, _clock) = processor_with(BatchConfig::new().with_max_batch_size(1));
        let other_seen = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&other_seen);

        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| {
            Err(EventError::failed("bad batch"))
        });
        processor.add_to_batch(OtherEvent::default(), move |events: &[OtherEvent]| {
            *sink.borrow_mut() += events.len();
            Ok(())
        });

        assert_eq!(processor.process_ready_batches(), 2);
        assert_eq!(*other_seen.borrow(), 1);
        assert_eq!(processor.pending_events(), 0);
    }

    #[test]
    fn test_panicking_processor_still_drains() {
        let (mut processor, _clock) = processor_with(BatchConfig::new().with_max_batch_size(2));
        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| panic!("processor exploded"));
        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| Ok(()));

        assert_eq!(processor.process_ready_batches(), 1);
        assert_eq!(processor.pending::<TestEvent>(), 0);
        assert_eq!(processor.total_events_processed(), 2);
    }

    #[test]
    fn test_processed_events_return_to_pool() {
        let pool = Arc::new(EventPool::default());
        let clock = ManualClock::new();
        let mut processor = BatchProcessor::with_clock(BatchConfig::default(), Arc::new(clock))
            .with_pool(Arc::clone(&pool));

        for _ in 0..3 {
            let event: TestEvent = pool.get();
            processor.add_to_batch(event, |_: &[TestEvent]| Ok(()));
        }
        processor.process_all_batches();

        let stats = pool.stats::<TestEvent>().unwrap();
        assert_eq!(stats.current_pool_size, 3);
        assert_eq!(stats.total_created, 3);
    }

    #[test]
    fn test_invalid_event_rejected() {
        let (mut processor, _clock) = processor_with(BatchConfig::default());
        let mut event = TestEvent::new(0);
        event.dispose();

        assert!(!processor.add_to_batch(event, |_: &[TestEvent]| Ok(())));
        assert_eq!(processor.pending_events(), 0);
        assert!(processor.pending_kinds().is_empty());
    }

    #[test]
    fn test_stats_accumulate_until_clear() {
        let (mut processor, clock) = processor_with(BatchConfig::new().with_max_batch_size(2));

        for _ in 0..2 {
            for _ in 0..2 {
                processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| Ok(()));
            }
            processor.process_ready_batches();
        }
        processor.add_to_batch(TestEvent::new(0), |_: &[TestEvent]| Ok(()));
        clock.advance(Duration::from_millis(4));

        let stats = processor.batch_stats();
        let test_stats = stats[&EventKind::of::<TestEvent>()];
        assert_eq!(test_stats.total_batches, 2);
        assert_eq!(test_stats.total_processed, 4);
        assert_eq!(test_stats.current_size, 1);
        assert_eq!(test_stats.time_since_first_event, Duration::from_millis(4));
        assert!((test_stats.avg_events_per_batch - 2.0).abs() < f64::EPSILON);
        assert_eq!(processor.total_batches_processed(), 2);

        processor.clear();
        assert!(processor.batch_stats().is_empty());
        assert_eq!(processor.total_events_processed(), 0);
    }

    #[test]
    fn test_events_invalidated_while_waiting_are_skipped() {
        let (mut processor, _clock) = processor_with(BatchConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let stale = Arc::new(AtomicBool::new(true));
        let fresh = Arc::new(AtomicBool::new(true));

        processor.add_to_batch(Expiring::new(1, &stale), move |events: &[Expiring]| {
            sink.borrow_mut().extend(events.iter().map(|e| e.tag));
            Ok(())
        });
        processor.add_to_batch(Expiring::new(2, &fresh), |_: &[Expiring]| Ok(()));
        stale.store(false, Ordering::SeqCst);

        assert_eq!(processor.process_all_batches(), 1);
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(processor.total_events_processed(), 1);

        let stats = processor.batch_stats();
        assert_eq!(stats[&EventKind::of::<Expiring>()].total_processed, 1);
    }

    #[test]
    fn test_all_invalid_batch_skips_processor() {
        let (mut processor, _clock) = processor_with(BatchConfig::new().with_max_batch_size(2));
        let called = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&called);
        let live = Arc::new(AtomicBool::new(true));

        processor.add_to_batch(Expiring::new(1, &live), move |_: &[Expiring]| {
            *flag.borrow_mut() = true;
            Ok(())
        });
        processor.add_to_batch(Expiring::new(2, &live), |_: &[Expiring]| Ok(()));
        live.store(false, Ordering::SeqCst);

        assert_eq!(processor.process_ready_batches(), 0);
        assert!(!*called.borrow());
        assert_eq!(processor.pending_events(), 0);
        assert_eq!(processor.total_batches_processed(), 0);
    }
}
