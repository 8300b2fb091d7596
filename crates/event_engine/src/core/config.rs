//! # Unified Configuration System
//!
//! All tunables for the event core live here, grouped per subsystem, and are
//! aggregated into [`DispatchConfig`] so a single TOML or RON file can
//! configure a whole dispatch layer.
//!
//! ## Configuration Categories
//!
//! - **Queue Config**: capacity ceiling and per-drain batch size
//! - **Pool Config**: retained-instance cap and pre-warming
//! - **Batch Config**: size and time thresholds for batch readiness

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::config::{Config, ConfigError, ConfigFormat};

/// # Queue Configuration
///
/// Limits for [`crate::events::queue::PriorityEventQueue`]. The capacity is a
/// soft ceiling enforced by rejecting enqueues, never by growing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of pending events
    pub max_capacity: usize,
    /// Upper bound on events drained by one `process_batch` call
    pub max_batch_size: usize,
}

impl QueueConfig {
    /// Create a queue configuration with default limits
    pub fn new() -> Self {
        Self {
            max_capacity: 10_000,
            max_batch_size: 100,
        }
    }

    /// Set the capacity ceiling
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Set the per-drain batch size
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_capacity == 0 {
            return Err("Queue capacity must be at least 1".to_string());
        }
        if self.max_batch_size == 0 {
            return Err("Queue batch size must be at least 1".to_string());
        }
        Ok(())
    }

    /// Replace out-of-range limits with the defaults, logging what changed
    pub fn sanitized(mut self) -> Self {
        if let Err(err) = self.validate() {
            log::warn!("{}, falling back to defaults for invalid limits", err);
            let defaults = Self::new();
            if self.max_capacity == 0 {
                self.max_capacity = defaults.max_capacity;
            }
            if self.max_batch_size == 0 {
                self.max_batch_size = defaults.max_batch_size;
            }
        }
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Pool Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Cap on retained instances for kinds registered without an explicit cap
    pub default_max_pool_size: usize,
    /// Instances constructed up front for each explicitly registered kind
    pub prewarm_count: usize,
}

impl PoolConfig {
    /// Create a pool configuration with default limits
    pub fn new() -> Self {
        Self {
            default_max_pool_size: 1000,
            prewarm_count: 0,
        }
    }

    /// Set the default retained-instance cap
    pub fn with_default_max_pool_size(mut self, size: usize) -> Self {
        self.default_max_pool_size = size;
        self
    }

    /// Set the pre-warm count used on registration
    pub fn with_prewarm_count(mut self, count: usize) -> Self {
        self.prewarm_count = count;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.prewarm_count > self.default_max_pool_size {
            return Err(format!(
                "Pre-warm count {} exceeds the pool cap {}",
                self.prewarm_count, self.default_max_pool_size
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Batch Configuration
///
/// Shared thresholds for every per-kind accumulator. A batch is ready once
/// it holds `max_batch_size` events or its oldest event is
/// `max_batch_time_secs` old.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Size threshold
    pub max_batch_size: usize,
    /// Time threshold in seconds (defaults to one 60 Hz frame)
    pub max_batch_time_secs: f64,
}

impl BatchConfig {
    /// Create a batch configuration with default thresholds
    pub fn new() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_time_secs: 1.0 / 60.0,
        }
    }

    /// Set the size threshold
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the time threshold in seconds
    pub fn with_max_batch_time_secs(mut self, secs: f64) -> Self {
        self.max_batch_time_secs = secs;
        self
    }

    /// Time threshold as a [`Duration`]
    ///
    /// Values that are not a positive number of seconds map to the default
    /// threshold.
    pub fn max_batch_time(&self) -> Duration {
        if self.max_batch_time_secs > 0.0 {
            if let Ok(time) = Duration::try_from_secs_f64(self.max_batch_time_secs) {
                return time;
            }
        }
        Duration::from_secs_f64(Self::new().max_batch_time_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("Batch size must be at least 1".to_string());
        }
        if !self.max_batch_time_secs.is_finite() || self.max_batch_time_secs <= 0.0 {
            return Err(format!(
                "Batch time must be a positive number of seconds, got {}",
                self.max_batch_time_secs
            ));
        }
        Ok(())
    }

    /// Replace out-of-range thresholds with the defaults, logging what changed
    pub fn sanitized(mut self) -> Self {
        if let Err(err) = self.validate() {
            log::warn!("{}, falling back to defaults for invalid thresholds", err);
            let defaults = Self::new();
            if self.max_batch_size == 0 {
                self.max_batch_size = defaults.max_batch_size;
            }
            if !self.max_batch_time_secs.is_finite() || self.max_batch_time_secs <= 0.0 {
                self.max_batch_time_secs = defaults.max_batch_time_secs;
            }
        }
        self
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Dispatch Configuration
///
/// Top-level configuration for a dispatch layer built on the event core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default log filter handed to `env_logger`
    pub log_level: String,
    /// Priority queue limits
    pub queue: QueueConfig,
    /// Event and wrapper pool limits
    pub pool: PoolConfig,
    /// Batch thresholds
    pub batch: BatchConfig,
}

impl DispatchConfig {
    /// Create a dispatch configuration with default settings
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            queue: QueueConfig::default(),
            pool: PoolConfig::default(),
            batch: BatchConfig::default(),
        }
    }

    /// Set log level
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set queue configuration
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Set pool configuration
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set batch configuration
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Validate every subsystem configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.queue.validate().map_err(ConfigError::Invalid)?;
        self.pool.validate().map_err(ConfigError::Invalid)?;
        self.batch.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for DispatchConfig {}
