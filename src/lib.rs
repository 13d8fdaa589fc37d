//! Adaptive bulkhead using an AIMD (Additive Increase Multiplicative Decrease) control loop
//!
//! The bulkhead protects a resource by capping how many calls may run against it at once.
//! Instead of a fixed cap, the limit is resized after every window of completed calls:
//!
//! 1. **Additive Increase**: a window whose failure and slow-call rates stay below their
//!    thresholds raises the limit by 1
//! 2. **Multiplicative Decrease**: a window that breaches either threshold halves the limit
//!
//! Admission is fail-fast. A call that finds no free permit is rejected immediately; nothing
//! is queued.
//!
//! # Basic Usage
//! ```
//! use std::time::Duration;
//! use adaptive_bulkhead::adaptive_bulkhead::{AdaptiveBulkheadConfig, PermitPool};
//!
//! let config = AdaptiveBulkheadConfig::builder()
//!     .min_limit(5)
//!     .max_limit(50)
//!     .window_size(5)
//!     .window_time(Duration::from_secs(2))
//!     .failure_rate_threshold(50.0)
//!     .slow_call_rate_threshold(50.0)
//!     .slow_call_duration_threshold(Duration::from_millis(200))
//!     .build();
//! let pool = PermitPool::new("inventory", config).expect("valid config");
//!
//! if pool.acquire_permission() {
//!     // ... call the protected resource ...
//!     pool.on_success(Duration::from_millis(50)).expect("permit is outstanding");
//! }
//! ```
//!
//! # Configuration
//! See [`adaptive_bulkhead::AdaptiveBulkheadConfig`] for tuning parameters
//!
//! # Metrics
//! Emits metrics and logs via the `InternalEvent` trait
pub mod adaptive_bulkhead;
#[cfg(test)]
pub mod test_utils;

#[macro_use]
extern crate tracing;

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
