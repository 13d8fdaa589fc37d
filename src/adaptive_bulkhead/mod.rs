//! Limit the number of requests concurrently executing against a protected resource.

mod controller;
pub mod error;
pub mod events;
pub mod future;
pub mod internal_event;
pub mod layer;
mod outcome;
mod pool;
pub mod service;
mod window;

use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use snafu::ensure;

pub use controller::AimdController;
pub use error::{BulkheadError, ConfigError};
pub use events::{EventChannel, LimitChangeEvent, LimitChangeKind, Subscription};
pub use layer::AdaptiveBulkheadLayer;
pub use outcome::OutcomeRecord;
pub use pool::{BulkheadState, Permit, PermitPool};
pub use service::AdaptiveBulkheadService;
pub use window::{SlidingWindow, Snapshot};

use error::{
    EventChannelCapacitySnafu, InitialLimitOutOfRangeSnafu, MaxBelowMinSnafu,
    MinLimitTooSmallSnafu, SlowCallDurationSnafu, ThresholdOutOfRangeSnafu, WindowSizeSnafu,
    WindowTimeSnafu,
};

/// Configuration of the adaptive bulkhead.
///
/// The limit always stays inside `[min_limit, max_limit]`. Outcomes are aggregated in windows
/// that close after `window_size` calls or `window_time`, whichever comes first. A closed window
/// whose failure rate or slow-call rate reaches its threshold halves the limit; any other
/// non-empty window raises it by one.
///
/// | Parameter | Default | Description |
/// |-----------|---------|-------------|
/// | `min_limit` | 1 | Floor for the concurrency limit, at least 1 |
/// | `max_limit` | 200 | Ceiling for the concurrency limit |
/// | `initial_limit` | `min_limit` | Limit before the first window closes |
/// | `window_size` | 100 | Outcomes per window |
/// | `window_time` | 60s | Longest a window may stay open |
/// | `failure_rate_threshold` | 50 | Percentage of failed calls that triggers a decrease |
/// | `slow_call_rate_threshold` | 100 | Percentage of slow calls that triggers a decrease |
/// | `slow_call_duration_threshold` | 60s | Calls taking longer than this are slow |
/// | `event_channel_capacity` | 256 | Buffered limit-change events per subscriber |
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use adaptive_bulkhead::adaptive_bulkhead::AdaptiveBulkheadConfig;
///
/// let config = AdaptiveBulkheadConfig::builder()
///     .min_limit(5)
///     .max_limit(50)
///     .window_time(Duration::from_secs(2))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Builder, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdaptiveBulkheadConfig {
    /// Floor for the concurrency limit. Multiplicative decrease never goes below it.
    #[builder(default = default_min_limit())]
    pub(super) min_limit: usize,

    /// Ceiling for the concurrency limit. Additive increase never goes above it.
    #[builder(default = default_max_limit())]
    pub(super) max_limit: usize,

    /// Starting limit. Falls back to `min_limit` when unset.
    pub(super) initial_limit: Option<usize>,

    /// Number of outcomes after which a window closes.
    #[builder(default = default_window_size())]
    pub(super) window_size: usize,

    /// Longest time a window may stay open before it is closed regardless of its sample count.
    #[builder(default = default_window_time())]
    #[serde(rename = "window_time_ms", with = "duration_ms")]
    pub(super) window_time: Duration,

    /// Percentage (0-100) of failed calls in a window at or above which the limit decreases.
    #[builder(default = default_failure_rate_threshold())]
    pub(super) failure_rate_threshold: f32,

    /// Percentage (0-100) of slow calls in a window at or above which the limit decreases.
    #[builder(default = default_slow_call_rate_threshold())]
    pub(super) slow_call_rate_threshold: f32,

    /// Calls whose duration exceeds this are counted as slow.
    #[builder(default = default_slow_call_duration_threshold())]
    #[serde(rename = "slow_call_duration_threshold_ms", with = "duration_ms")]
    pub(super) slow_call_duration_threshold: Duration,

    /// How many limit-change events a subscriber may fall behind before it starts missing them.
    #[builder(default = default_event_channel_capacity())]
    pub(super) event_channel_capacity: usize,
}

const fn default_min_limit() -> usize {
    1
}

const fn default_max_limit() -> usize {
    200
}

const fn default_window_size() -> usize {
    100
}

const fn default_window_time() -> Duration {
    Duration::from_secs(60)
}

const fn default_failure_rate_threshold() -> f32 {
    50.0
}

const fn default_slow_call_rate_threshold() -> f32 {
    100.0
}

const fn default_slow_call_duration_threshold() -> Duration {
    Duration::from_secs(60)
}

const fn default_event_channel_capacity() -> usize {
    256
}

impl Default for AdaptiveBulkheadConfig {
    fn default() -> Self {
        Self {
            min_limit: default_min_limit(),
            max_limit: default_max_limit(),
            initial_limit: None,
            window_size: default_window_size(),
            window_time: default_window_time(),
            failure_rate_threshold: default_failure_rate_threshold(),
            slow_call_rate_threshold: default_slow_call_rate_threshold(),
            slow_call_duration_threshold: default_slow_call_duration_threshold(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl AdaptiveBulkheadConfig {
    /// Checks every invariant of the configuration table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.min_limit >= 1,
            MinLimitTooSmallSnafu {
                min_limit: self.min_limit
            }
        );
        ensure!(
            self.max_limit >= self.min_limit,
            MaxBelowMinSnafu {
                min_limit: self.min_limit,
                max_limit: self.max_limit,
            }
        );
        if let Some(initial_limit) = self.initial_limit {
            ensure!(
                (self.min_limit..=self.max_limit).contains(&initial_limit),
                InitialLimitOutOfRangeSnafu {
                    initial_limit,
                    min_limit: self.min_limit,
                    max_limit: self.max_limit,
                }
            );
        }
        ensure!(self.window_size >= 1, WindowSizeSnafu);
        ensure!(!self.window_time.is_zero(), WindowTimeSnafu);
        ensure!(
            !self.slow_call_duration_threshold.is_zero(),
            SlowCallDurationSnafu
        );
        for (name, value) in [
            ("failure_rate_threshold", self.failure_rate_threshold),
            ("slow_call_rate_threshold", self.slow_call_rate_threshold),
        ] {
            ensure!(
                value.is_finite() && (0.0..=100.0).contains(&value),
                ThresholdOutOfRangeSnafu { name, value }
            );
        }
        ensure!(self.event_channel_capacity >= 1, EventChannelCapacitySnafu);
        Ok(())
    }

    pub fn get_min_limit(&self) -> usize {
        self.min_limit
    }

    pub fn get_max_limit(&self) -> usize {
        self.max_limit
    }

    /// The limit a new bulkhead starts with.
    pub fn get_initial_limit(&self) -> usize {
        self.initial_limit.unwrap_or(self.min_limit)
    }

    pub fn get_window_size(&self) -> usize {
        self.window_size
    }

    pub fn get_window_time(&self) -> Duration {
        self.window_time
    }

    pub fn get_failure_rate_threshold(&self) -> f32 {
        self.failure_rate_threshold
    }

    pub fn get_slow_call_rate_threshold(&self) -> f32 {
        self.slow_call_rate_threshold
    }

    pub fn get_slow_call_duration_threshold(&self) -> Duration {
        self.slow_call_duration_threshold
    }

    pub fn get_event_channel_capacity(&self) -> usize {
        self.event_channel_capacity
    }
}

/// Durations travel as whole milliseconds in serialized configuration.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
