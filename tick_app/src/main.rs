//! Simulated tick loop driving the event core
//!
//! Spawns a random workload of collision and spawn events each tick, drains
//! them through the priority queue, batches per-event telemetry, and logs
//! queue, pool and batch statistics at shutdown.
//!
//! Usage: `tick_app [config.toml|config.ron] [ticks]`

mod events;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use event_engine::core::config::{Config, ConfigError, DispatchConfig};
use event_engine::events::{BatchProcessor, Event, EventError, EventHandle, PriorityEventQueue};
use event_engine::foundation::logging;
use event_engine::foundation::time::{ManualClock, SystemClock, Timer};
use event_engine::pool::{EventPool, PoolService};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use events::{CollisionEvent, SimEvent, SpawnEvent, TelemetrySample};

const DEFAULT_TICKS: u64 = 600;
const TICK_SECONDS: f64 = 1.0 / 60.0;
const MAX_EVENTS_PER_TICK: usize = 64;
const MAX_SPAWNS_PER_TICK: usize = 12;
const CANCEL_EVERY: u64 = 10;
const RNG_SEED: u64 = 0x5EED;

/// Errors that stop the application
#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Default)]
struct TelemetrySummary {
    batches: u64,
    samples: u64,
    collisions: u64,
    spawns: u64,
}

struct TickApp {
    clock: ManualClock,
    timer: Timer,
    rng: StdRng,
    pool: Arc<EventPool>,
    queue: PriorityEventQueue<SimEvent>,
    batches: BatchProcessor,
    telemetry: Rc<RefCell<TelemetrySummary>>,
    pending: Vec<EventHandle>,
    handler_failures: u64,
}

impl TickApp {
    fn new(config: &DispatchConfig, service: &PoolService) -> Self {
        let clock = ManualClock::new();
        let shared_clock = Arc::new(clock.clone());
        let pool = Arc::clone(service.events());

        pool.register::<CollisionEvent>(config.pool.default_max_pool_size);
        pool.register::<SpawnEvent>(config.pool.default_max_pool_size / 4);
        pool.register::<TelemetrySample>(config.batch.max_batch_size * 2);

        Self {
            timer: Timer::with_clock(shared_clock.clone()),
            // Drains are timed in wall-clock time; the loop itself runs on the
            // simulated clock.
            queue: PriorityEventQueue::with_clock(config.queue.clone(), SystemClock::shared()),
            batches: BatchProcessor::with_clock(config.batch.clone(), shared_clock)
                .with_pool(Arc::clone(&pool)),
            clock,
            rng: StdRng::seed_from_u64(RNG_SEED),
            pool,
            telemetry: Rc::new(RefCell::new(TelemetrySummary::default())),
            pending: Vec::new(),
            handler_failures: 0,
        }
    }

    fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.clock.advance_secs(TICK_SECONDS);
            self.timer.update();
            self.tick();
        }

        let flushed = self.batches.process_all_batches();
        log::info!("Flushed {} remaining telemetry batches at shutdown", flushed);
    }

    fn tick(&mut self) {
        self.produce();

        if self.timer.frame_count() % CANCEL_EVERY == 0 {
            self.cancel_one();
        }

        let outbox = self.drain_queue();
        self.pending.retain(|handle| self.queue.contains(*handle));

        for (kind, priority) in outbox {
            let mut sample: TelemetrySample = self.pool.get();
            sample.kind = kind;
            sample.priority_seen = priority;
            let telemetry = Rc::clone(&self.telemetry);
            self.batches.add_to_batch(sample, move |samples: &[TelemetrySample]| {
                let mut summary = telemetry.borrow_mut();
                summary.batches += 1;
                for sample in samples {
                    summary.samples += 1;
                    match sample.kind {
                        "collision" => summary.collisions += 1,
                        "spawn" => summary.spawns += 1,
                        _ => {}
                    }
                }
                Ok(())
            });
        }
        self.batches.process_ready_batches();
    }

    // Drains one tick's worth of events, returning (label, priority) for
    // every event handed to the handler.
    fn drain_queue(&mut self) -> Vec<(&'static str, i32)> {
        let pool = Arc::clone(&self.pool);
        let mut outbox: Vec<(&'static str, i32)> = Vec::new();
        let mut failures = 0_u64;
        let handled = self.queue.process_batch(
            |event| {
                let label = event.label();
                let priority = event.priority();
                outbox.push((label, priority));

                match &event {
                    SimEvent::Collision(c) => {
                        let (a, b) = (c.entity_a, c.entity_b);
                        log::trace!("contact {} <-> {} ({:.2})", a, b, c.impulse);
                    }
                    SimEvent::Spawn(s) => {
                        log::trace!("spawn archetype {} at {:?}", s.archetype, s.position);
                    }
                }

                // Glancing contacts below the noise floor are treated as bad
                // physics data and rejected.
                let rejected = matches!(&event, SimEvent::Collision(c) if c.impulse < 0.01);
                event.release_to(&pool);
                if rejected {
                    failures += 1;
                    return Err(EventError::failed("impulse below noise floor"));
                }
                Ok(())
            },
            MAX_EVENTS_PER_TICK,
        );
        self.handler_failures += failures;
        log::trace!("Handled {} events this tick", handled);
        outbox
    }

    fn produce(&mut self) {
        let count = self.rng.gen_range(0..MAX_SPAWNS_PER_TICK);
        for _ in 0..count {
            let event = if self.rng.gen_bool(0.7) {
                let mut collision: CollisionEvent = self.pool.get();
                collision.set(
                    self.rng.gen_range(0..1000),
                    self.rng.gen_range(0..1000),
                    self.rng.gen_range(0.0..10.0),
                    self.rng.gen_range(0..100),
                );
                SimEvent::Collision(collision)
            } else {
                let mut spawn: SpawnEvent = self.pool.get();
                spawn.set(
                    self.rng.gen_range(0..8),
                    [self.rng.gen_range(-50.0..50.0), 0.0, self.rng.gen_range(-50.0..50.0)],
                    self.rng.gen_range(50..150),
                );
                SimEvent::Spawn(spawn)
            };

            match self.queue.enqueue(event) {
                Ok(handle) => self.pending.push(handle),
                Err(err) => log::debug!("Event not queued: {}", err),
            }
        }
    }

    // Pulls the oldest still-pending event back out, as a producer would
    // when the entity it referred to was destroyed.
    fn cancel_one(&mut self) {
        while let Some(handle) = self.pending.first().copied() {
            self.pending.remove(0);
            if let Some(event) = self.queue.remove(handle) {
                log::debug!("Cancelled pending {} event", event.label());
                event.release_to(&self.pool);
                return;
            }
        }
    }

    fn report(&self) {
        let stats = self.queue.stats();
        log::info!(
            "Queue: {} pending, peak {}, processed {}, last drain {:.3} ms, capacity {}",
            stats.current_size,
            stats.peak_size,
            stats.total_processed,
            stats.last_process_time_ms,
            stats.capacity
        );
        log::info!("Handler failures: {}", self.handler_failures);

        for (kind, stats) in self.batches.batch_stats() {
            log::info!(
                "Batches {}: {} batches, {} events, {:.1} events/batch",
                kind,
                stats.total_batches,
                stats.total_processed,
                stats.avg_events_per_batch
            );
        }

        let summary = self.telemetry.borrow();
        log::info!(
            "Telemetry: {} samples in {} batches ({} collisions, {} spawns)",
            summary.samples,
            summary.batches,
            summary.collisions,
            summary.spawns
        );
        log::info!(
            "Simulated {:.1}s at {:.0} ticks/s",
            self.timer.total_time(),
            self.timer.average_fps()
        );
    }
}

fn parse_args() -> Result<(DispatchConfig, u64), AppError> {
    let mut config = DispatchConfig::default();
    let mut ticks = DEFAULT_TICKS;

    for arg in std::env::args().skip(1) {
        if let Ok(value) = arg.parse::<u64>() {
            ticks = value;
        } else if arg.ends_with(".toml") || arg.ends_with(".ron") {
            config = DispatchConfig::load_from_file(&arg)?;
        } else {
            return Err(AppError::InvalidArgument(arg));
        }
    }

    config.validate()?;
    Ok((config, ticks))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (config, ticks) = parse_args()?;
    logging::init_with_level(&config.log_level);

    log::info!(
        "Starting tick loop: {} ticks of {:?}",
        ticks,
        Duration::from_secs_f64(TICK_SECONDS)
    );

    let service = PoolService::new(config.pool.clone());
    service.initialize()?;

    let mut app = TickApp::new(&config, &service);
    app.run(ticks);
    app.report();

    service.shutdown();
    log::info!("Tick loop completed");
    Ok(())
}
