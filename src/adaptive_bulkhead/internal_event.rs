//! Metrics and logs emitted by the bulkhead's control loop.
//!
//! Every metric carries a `bulkhead` label holding the bulkhead's name. The labelled handles are
//! registered once per bulkhead in [`BulkheadMetrics::register`], so the admission path only
//! touches pre-resolved handles.

use metrics::{Counter, Gauge, Histogram, counter, gauge, histogram};

use super::{OutcomeRecord, Snapshot};

pub trait InternalEvent: Sized {
    fn emit(self);
}

/// Metric handles of one bulkhead.
#[derive(Debug)]
pub struct BulkheadMetrics {
    bulkhead: String,
    limit: Gauge,
    // A histogram, as in-flight takes many values per reporting interval.
    in_flight: Histogram,
    calls_rejected: Counter,
    call_duration: Histogram,
    calls_failed: Counter,
    calls_slow: Counter,
    window_samples: Histogram,
    window_failure_rate: Histogram,
    window_slow_call_rate: Histogram,
    limit_increases: Counter,
    limit_decreases: Counter,
}

impl BulkheadMetrics {
    pub fn register(bulkhead: &str) -> Self {
        let label = bulkhead.to_owned();
        Self {
            limit: gauge!("adaptive_bulkhead_limit", "bulkhead" => label.clone()),
            in_flight: histogram!("adaptive_bulkhead_in_flight", "bulkhead" => label.clone()),
            calls_rejected: counter!(
                "adaptive_bulkhead_calls_rejected_total",
                "bulkhead" => label.clone()
            ),
            call_duration: histogram!(
                "adaptive_bulkhead_call_duration_seconds",
                "bulkhead" => label.clone()
            ),
            calls_failed: counter!(
                "adaptive_bulkhead_calls_failed_total",
                "bulkhead" => label.clone()
            ),
            calls_slow: counter!("adaptive_bulkhead_calls_slow_total", "bulkhead" => label.clone()),
            window_samples: histogram!(
                "adaptive_bulkhead_window_samples",
                "bulkhead" => label.clone()
            ),
            window_failure_rate: histogram!(
                "adaptive_bulkhead_window_failure_rate",
                "bulkhead" => label.clone()
            ),
            window_slow_call_rate: histogram!(
                "adaptive_bulkhead_window_slow_call_rate",
                "bulkhead" => label.clone()
            ),
            limit_increases: counter!(
                "adaptive_bulkhead_limit_changes_total",
                "bulkhead" => label.clone(),
                "direction" => "increase"
            ),
            limit_decreases: counter!(
                "adaptive_bulkhead_limit_changes_total",
                "bulkhead" => label.clone(),
                "direction" => "decrease"
            ),
            bulkhead: label,
        }
    }

    pub fn bulkhead(&self) -> &str {
        &self.bulkhead
    }
}

#[derive(Debug)]
pub struct BulkheadCreated<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub limit: usize,
    pub min_limit: usize,
    pub max_limit: usize,
}

impl InternalEvent for BulkheadCreated<'_> {
    fn emit(self) {
        self.metrics.limit.set(self.limit as f64);
        debug!(
            message = "Adaptive bulkhead created.",
            bulkhead = self.metrics.bulkhead(),
            limit = self.limit,
            min_limit = self.min_limit,
            max_limit = self.max_limit,
        );
    }
}

#[derive(Debug)]
pub struct BulkheadCallPermitted<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub in_flight: usize,
}

impl InternalEvent for BulkheadCallPermitted<'_> {
    fn emit(self) {
        self.metrics.in_flight.record(self.in_flight as f64);
        trace!(
            target: "adaptive_bulkhead::stats",
            bulkhead = self.metrics.bulkhead(),
            in_flight = self.in_flight,
            "Permit granted"
        );
    }
}

#[derive(Debug)]
pub struct BulkheadCallRejected<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub limit: usize,
}

impl InternalEvent for BulkheadCallRejected<'_> {
    fn emit(self) {
        self.metrics.calls_rejected.increment(1);
        trace!(
            target: "adaptive_bulkhead::stats",
            bulkhead = self.metrics.bulkhead(),
            limit = self.limit,
            "Permit rejected"
        );
    }
}

#[derive(Debug)]
pub struct BulkheadCallFinished<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub outcome: &'a OutcomeRecord,
}

impl InternalEvent for BulkheadCallFinished<'_> {
    fn emit(self) {
        self.metrics.call_duration.record(self.outcome.duration());
        if self.outcome.failed() {
            self.metrics.calls_failed.increment(1);
        }
        if self.outcome.is_slow() {
            self.metrics.calls_slow.increment(1);
        }
        trace!(
            target: "adaptive_bulkhead::stats",
            bulkhead = self.metrics.bulkhead(),
            succeeded = self.outcome.succeeded(),
            slow = self.outcome.is_slow(),
            duration_ms = self.outcome.duration().as_millis(),
            "Call finished"
        );
    }
}

#[derive(Debug)]
pub struct BulkheadWindowClosed<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub snapshot: &'a Snapshot,
}

impl InternalEvent for BulkheadWindowClosed<'_> {
    fn emit(self) {
        self.metrics
            .window_samples
            .record(self.snapshot.sample_count() as f64);
        // Empty windows carry no rates worth charting.
        if !self.snapshot.is_empty() {
            self.metrics
                .window_failure_rate
                .record(f64::from(self.snapshot.failure_rate()));
            self.metrics
                .window_slow_call_rate
                .record(f64::from(self.snapshot.slow_call_rate()));
        }
        debug!(
            target: "adaptive_bulkhead::stats",
            bulkhead = self.metrics.bulkhead(),
            samples = self.snapshot.sample_count(),
            failure_rate = self.snapshot.failure_rate(),
            slow_call_rate = self.snapshot.slow_call_rate(),
            "Window closed"
        );
    }
}

#[derive(Debug)]
pub struct BulkheadLimitChanged<'a> {
    pub metrics: &'a BulkheadMetrics,
    pub old_limit: usize,
    pub new_limit: usize,
}

impl InternalEvent for BulkheadLimitChanged<'_> {
    fn emit(self) {
        let direction = if self.new_limit > self.old_limit {
            self.metrics.limit_increases.increment(1);
            "increase"
        } else {
            self.metrics.limit_decreases.increment(1);
            "decrease"
        };
        self.metrics.limit.set(self.new_limit as f64);
        info!(
            target: "adaptive_bulkhead::stats",
            bulkhead = self.metrics.bulkhead(),
            old_limit = self.old_limit,
            new_limit = self.new_limit,
            direction,
            "Limit adjusted"
        );
    }
}

#[derive(Debug)]
pub struct BulkheadUnmatchedRelease<'a> {
    pub bulkhead: &'a str,
}

impl InternalEvent for BulkheadUnmatchedRelease<'_> {
    fn emit(self) {
        warn!(
            message = "Outcome reported without an outstanding permit; ignoring it.",
            bulkhead = self.bulkhead,
        );
    }
}
