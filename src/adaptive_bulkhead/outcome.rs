use std::time::Duration;

/// One completed call, as seen by the sliding window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutcomeRecord {
    succeeded: bool,
    duration: Duration,
    slow: bool,
}

impl OutcomeRecord {
    /// Classifies a finished call. It is slow when `duration` is strictly above
    /// `slow_call_duration_threshold`, whether or not it succeeded.
    pub fn new(
        succeeded: bool,
        duration: Duration,
        slow_call_duration_threshold: Duration,
    ) -> Self {
        Self {
            succeeded,
            duration,
            slow: duration > slow_call_duration_threshold,
        }
    }

    pub const fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub const fn failed(&self) -> bool {
        !self.succeeded
    }

    pub const fn duration(&self) -> Duration {
        self.duration
    }

    pub const fn is_slow(&self) -> bool {
        self.slow
    }
}
