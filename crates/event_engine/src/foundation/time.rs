//! Time management utilities
//!
//! Everything time-sensitive in the event core (batch windows, drain timing)
//! reads time through the [`Clock`] trait so tests can drive a simulated
//! clock instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin. Never decreases.
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is the current instant
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Shared handle suitable for the queue and batch processor
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Simulated clock that only moves when told to
///
/// Cloning shares the underlying time, so a test can keep one handle and
/// give another to the component under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Move the clock forward by a number of seconds
    pub fn advance_secs(&self, secs: f64) {
        self.advance(Duration::from_secs_f64(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Per-frame timer for tick loops
pub struct Timer {
    clock: Arc<dyn Clock>,
    last_frame: Duration,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create a new timer on the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            clock,
            last_frame: now,
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per tick)
    pub fn update(&mut self) {
        let now = self.clock.now();
        self.delta_time = now.saturating_sub(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Get the time since the last tick in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current tick count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the average ticks per second since timer creation
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    clock: Arc<dyn Clock>,
    start_time: Option<Duration>,
    elapsed: Duration,
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new(clock: Arc<dyn Clock>) -> Self {
        let mut stopwatch = Self::new(clock);
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(self.clock.now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += self.clock.now().saturating_sub(start);
        }
    }

    /// Reset the stopwatch to zero
    pub fn reset(&mut self) {
        self.start_time = None;
        self.elapsed = Duration::ZERO;
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        let current = self
            .start_time
            .map_or(Duration::ZERO, |start| self.clock.now().saturating_sub(start));
        self.elapsed + current
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Check if the stopwatch is currently running
    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shares_time_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        handle.advance_secs(0.25);
        assert_eq!(clock.now(), Duration::from_millis(250));
    }

    #[test]
    fn test_stopwatch_accumulates_across_runs() {
        let clock = ManualClock::new();
        let mut stopwatch = Stopwatch::start_new(Arc::new(clock.clone()));

        clock.advance(Duration::from_millis(10));
        stopwatch.stop();
        clock.advance(Duration::from_millis(100));
        assert!(!stopwatch.is_running());

        stopwatch.start();
        clock.advance(Duration::from_millis(5));
        assert_eq!(stopwatch.elapsed(), Duration::from_millis(15));
        assert!((stopwatch.elapsed_millis() - 15.0).abs() < 1e-9);

        stopwatch.reset();
        assert_eq!(stopwatch.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_timer_tracks_ticks() {
        let clock = ManualClock::new();
        let mut timer = Timer::with_clock(Arc::new(clock.clone()));

        clock.advance(Duration::from_millis(500));
        timer.update();
        clock.advance(Duration::from_millis(500));
        timer.update();

        assert_eq!(timer.frame_count(), 2);
        assert!((timer.delta_time() - 0.5).abs() < 1e-6);
        assert!((timer.total_time() - 1.0).abs() < 1e-6);
        assert!((timer.average_fps() - 2.0).abs() < 1e-4);
    }
}
