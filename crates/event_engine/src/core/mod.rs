//! # Core Module
//!
//! Shared configuration types used by every subsystem of the event core.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for the queue, pools and batch processor
//! - **Foundation**: Low-level utilities (time, logging)

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    BatchConfig,
    Config,
    ConfigError,
    DispatchConfig,
    PoolConfig,
    QueueConfig,
};
