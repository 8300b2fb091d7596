//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the event core:
//! - Time management (monotonic clocks, timers, stopwatches)
//! - Logging utilities

pub mod time;
pub mod logging;
