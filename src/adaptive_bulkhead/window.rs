use std::time::Duration;

use tokio::time::Instant;

use super::OutcomeRecord;

/// Aggregated statistics of one closed window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    sample_count: usize,
    failed_calls: usize,
    slow_calls: usize,
    failure_rate: f32,
    slow_call_rate: f32,
    window_started_at: Instant,
}

impl Snapshot {
    fn aggregate(
        sample_count: usize,
        failed_calls: usize,
        slow_calls: usize,
        window_started_at: Instant,
    ) -> Self {
        Self {
            sample_count,
            failed_calls,
            slow_calls,
            failure_rate: percentage(failed_calls, sample_count),
            slow_call_rate: percentage(slow_calls, sample_count),
            window_started_at,
        }
    }

    pub const fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// A window that closed without any outcome carries no signal.
    pub const fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub const fn failed_calls(&self) -> usize {
        self.failed_calls
    }

    pub const fn slow_calls(&self) -> usize {
        self.slow_calls
    }

    /// Percentage (0-100) of failed calls.
    pub const fn failure_rate(&self) -> f32 {
        self.failure_rate
    }

    /// Percentage (0-100) of slow calls.
    pub const fn slow_call_rate(&self) -> f32 {
        self.slow_call_rate
    }

    pub const fn window_started_at(&self) -> Instant {
        self.window_started_at
    }
}

fn percentage(part: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f32 / total as f32
}

/// Accumulates outcomes until the window is full, then hands back a [`Snapshot`] and starts over.
///
/// A window closes when it holds `size` outcomes or when `time` has elapsed since it opened,
/// whichever happens first. Counting alone would stall under low traffic; timing alone would
/// produce noisy rates under bursts.
///
/// Only counts are kept, so memory does not grow with `size`.
///
/// Not synchronised. The owner serialises access so that each window is closed exactly once.
#[derive(Debug)]
pub struct SlidingWindow {
    size: usize,
    time: Duration,
    sample_count: usize,
    failed_calls: usize,
    slow_calls: usize,
    opened_at: Instant,
}

impl SlidingWindow {
    pub fn new(size: usize, time: Duration, now: Instant) -> Self {
        Self {
            size,
            time,
            sample_count: 0,
            failed_calls: 0,
            slow_calls: 0,
            opened_at: now,
        }
    }

    /// Appends `outcome`. Returns the snapshot if this append closed the window.
    pub fn record(&mut self, outcome: OutcomeRecord, now: Instant) -> Option<Snapshot> {
        self.sample_count += 1;
        self.failed_calls += usize::from(outcome.failed());
        self.slow_calls += usize::from(outcome.is_slow());

        if self.sample_count >= self.size || self.is_expired(now) {
            Some(self.close(now))
        } else {
            None
        }
    }

    /// Closes the window if its time bound has passed, even when it holds no outcomes.
    pub fn close_if_expired(&mut self, now: Instant) -> Option<Snapshot> {
        self.is_expired(now).then(|| self.close(now))
    }

    pub fn len(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.opened_at) >= self.time
    }

    fn close(&mut self, now: Instant) -> Snapshot {
        let snapshot = Snapshot::aggregate(
            self.sample_count,
            self.failed_calls,
            self.slow_calls,
            self.opened_at,
        );
        self.sample_count = 0;
        self.failed_calls = 0;
        self.slow_calls = 0;
        self.opened_at = now;
        snapshot
    }
}
