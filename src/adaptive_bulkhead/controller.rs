use std::cmp;

use super::{AdaptiveBulkheadConfig, Snapshot};

/// The AIMD decision function.
///
/// Holds only the bounds and thresholds it was built from, so it is freely shared. A window
/// produces at most one adjustment: a halving when either rate reaches its threshold, otherwise
/// an increment of one. Both thresholds breached together still halve only once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AimdController {
    min_limit: usize,
    max_limit: usize,
    failure_rate_threshold: f32,
    slow_call_rate_threshold: f32,
}

impl AimdController {
    pub fn new(config: &AdaptiveBulkheadConfig) -> Self {
        Self {
            min_limit: config.min_limit,
            max_limit: config.max_limit,
            failure_rate_threshold: config.failure_rate_threshold,
            slow_call_rate_threshold: config.slow_call_rate_threshold,
        }
    }

    /// The limit that should follow `current_limit` given the closed window `snapshot`.
    pub fn decide(&self, current_limit: usize, snapshot: &Snapshot) -> usize {
        if snapshot.is_empty() {
            return current_limit;
        }

        if self.is_congested(snapshot) {
            cmp::max(self.min_limit, current_limit / 2)
        } else {
            cmp::min(self.max_limit, current_limit.saturating_add(1))
        }
    }

    fn is_congested(&self, snapshot: &Snapshot) -> bool {
        snapshot.failure_rate() >= self.failure_rate_threshold
            || snapshot.slow_call_rate() >= self.slow_call_rate_threshold
    }
}
