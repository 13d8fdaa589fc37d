use snafu::Snafu;

/// A configuration table that violates one of the bulkhead's invariants.
///
/// Returned by [`AdaptiveBulkheadConfig::validate`](super::AdaptiveBulkheadConfig::validate)
/// and therefore by [`PermitPool::new`](super::PermitPool::new), which never hands out a
/// limiter built from an invalid table.
#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("min_limit must be at least 1, got {min_limit}"))]
    MinLimitTooSmall { min_limit: usize },

    #[snafu(display("max_limit ({max_limit}) must not be below min_limit ({min_limit})"))]
    MaxBelowMin { min_limit: usize, max_limit: usize },

    #[snafu(display(
        "initial_limit ({initial_limit}) must lie within [{min_limit}, {max_limit}]"
    ))]
    InitialLimitOutOfRange {
        initial_limit: usize,
        min_limit: usize,
        max_limit: usize,
    },

    #[snafu(display("window_size must be at least 1"))]
    WindowSize,

    #[snafu(display("window_time must be greater than zero"))]
    WindowTime,

    #[snafu(display("slow_call_duration_threshold must be greater than zero"))]
    SlowCallDuration,

    #[snafu(display("{name} must be a percentage within [0, 100], got {value}"))]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[snafu(display("event_channel_capacity must be at least 1"))]
    EventChannelCapacity,
}

/// Errors raised while the bulkhead is in use.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BulkheadError {
    /// No permit was free. Only the tower wrapper turns a rejection into an error; calling
    /// [`PermitPool::acquire_permission`](super::PermitPool::acquire_permission) directly just
    /// returns `false`.
    #[snafu(display("Bulkhead '{name}' is full and does not permit further calls"))]
    BulkheadFull { name: String },

    /// An outcome or release arrived while no permit was outstanding.
    #[snafu(display("Bulkhead '{name}' has no outstanding permit to release"))]
    NoOutstandingPermit { name: String },
}
