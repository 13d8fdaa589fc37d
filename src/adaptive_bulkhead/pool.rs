use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{self, AtomicUsize},
    },
    time::Duration,
};

use tokio::time::Instant;

use super::{
    AdaptiveBulkheadConfig, AimdController, BulkheadError, ConfigError, EventChannel,
    LimitChangeEvent, OutcomeRecord, SlidingWindow, Snapshot,
    error::NoOutstandingPermitSnafu,
    internal_event::{
        BulkheadCallFinished, BulkheadCallPermitted, BulkheadCallRejected, BulkheadCreated,
        BulkheadLimitChanged, BulkheadMetrics, BulkheadUnmatchedRelease, BulkheadWindowClosed,
        InternalEvent,
    },
};

/// The admission gate of an adaptive bulkhead.
///
/// Grants a permit while fewer than `limit` calls are in flight and rejects immediately
/// otherwise. Every granted permit must be returned exactly once, through
/// [`on_outcome`](Self::on_outcome) (which also feeds the sliding window) or
/// [`release_permission`](Self::release_permission).
///
/// The limit only moves when a window closes. Closing the window, deciding and storing the new
/// limit all happen under the window lock, so each window produces exactly one adjustment no
/// matter how many threads complete calls at the same moment. Limit changes are published under
/// the same lock, so subscribers see them in the order they were applied. A decrease does not
/// revoke permits already handed out, so `in_flight` may sit above `limit` until those calls
/// finish.
#[derive(Debug)]
pub struct PermitPool {
    name: String,
    config: AdaptiveBulkheadConfig,
    controller: AimdController,

    /// Written only while holding `window`.
    limit: AtomicUsize,
    in_flight: AtomicUsize,

    window: Mutex<SlidingWindow>,
    events: EventChannel,
    metrics: BulkheadMetrics,
}

/// A view of the [`PermitPool`] counters.
///
/// Not guaranteed to be consistent under high concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadState {
    limit: usize,
    in_flight: usize,
    available: usize,
}

impl PermitPool {
    /// Builds a bulkhead named `name`, starting at the configured initial limit.
    pub fn new(
        name: impl Into<String>,
        config: AdaptiveBulkheadConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let name = name.into();
        let limit = config.get_initial_limit();
        let metrics = BulkheadMetrics::register(&name);

        BulkheadCreated {
            metrics: &metrics,
            limit,
            min_limit: config.min_limit,
            max_limit: config.max_limit,
        }
        .emit();

        Ok(Self {
            controller: AimdController::new(&config),
            limit: AtomicUsize::new(limit),
            in_flight: AtomicUsize::new(0),
            window: Mutex::new(SlidingWindow::new(
                config.window_size,
                config.window_time,
                Instant::now(),
            )),
            events: EventChannel::new(config.event_channel_capacity),
            metrics,
            name,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AdaptiveBulkheadConfig {
        &self.config
    }

    /// Limit-change notifications for this bulkhead.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn limit(&self) -> usize {
        self.limit.load(atomic::Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(atomic::Ordering::Acquire)
    }

    /// Permits that could be granted right now.
    pub fn available(&self) -> usize {
        self.limit().saturating_sub(self.in_flight())
    }

    pub fn state(&self) -> BulkheadState {
        let limit = self.limit();
        let in_flight = self.in_flight();
        BulkheadState {
            limit,
            in_flight,
            available: limit.saturating_sub(in_flight),
        }
    }

    /// Grants a permit if one is free. Never blocks and never queues.
    pub fn acquire_permission(&self) -> bool {
        let granted = self.in_flight.fetch_update(
            atomic::Ordering::AcqRel,
            atomic::Ordering::Acquire,
            |in_flight| (in_flight < self.limit()).then_some(in_flight + 1),
        );

        match granted {
            Ok(previous) => {
                BulkheadCallPermitted {
                    metrics: &self.metrics,
                    in_flight: previous + 1,
                }
                .emit();
                true
            }
            Err(_) => {
                BulkheadCallRejected {
                    metrics: &self.metrics,
                    limit: self.limit(),
                }
                .emit();
                false
            }
        }
    }

    /// Like [`acquire_permission`](Self::acquire_permission), but returns a [`Permit`] that
    /// measures the call and gives the permit back when dropped.
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        self.acquire_permission().then(|| Permit {
            pool: Some(Arc::clone(self)),
            started_at: Instant::now(),
        })
    }

    /// Returns a permit and records how the call went.
    ///
    /// If the outcome closes the current window, the limit is adjusted and a
    /// [`LimitChangeEvent`] is published when it actually moved.
    pub fn on_outcome(&self, succeeded: bool, duration: Duration) -> Result<(), BulkheadError> {
        self.return_permit()?;

        let outcome =
            OutcomeRecord::new(succeeded, duration, self.config.slow_call_duration_threshold);
        BulkheadCallFinished {
            metrics: &self.metrics,
            outcome: &outcome,
        }
        .emit();

        let mut window = self.lock_window();
        if let Some(snapshot) = window.record(outcome, Instant::now()) {
            self.apply(&snapshot);
        }
        Ok(())
    }

    pub fn on_success(&self, duration: Duration) -> Result<(), BulkheadError> {
        self.on_outcome(true, duration)
    }

    pub fn on_error(&self, duration: Duration) -> Result<(), BulkheadError> {
        self.on_outcome(false, duration)
    }

    /// Returns a permit without recording an outcome, e.g. for a cancelled call.
    pub fn release_permission(&self) -> Result<(), BulkheadError> {
        self.return_permit()
    }

    /// Closes the current window if it has been open for `window_time`, even if no outcome
    /// arrived to close it. An empty window leaves the limit unchanged.
    ///
    /// Returns the snapshot of the closed window, if any.
    pub fn close_expired_window(&self) -> Option<Snapshot> {
        let mut window = self.lock_window();
        let snapshot = window.close_if_expired(Instant::now())?;
        self.apply(&snapshot);
        Some(snapshot)
    }

    fn return_permit(&self) -> Result<(), BulkheadError> {
        let released = self.in_flight.fetch_update(
            atomic::Ordering::AcqRel,
            atomic::Ordering::Acquire,
            |in_flight| in_flight.checked_sub(1),
        );

        match released {
            Ok(previous) => {
                trace!(bulkhead = %self.name, in_flight = previous - 1, "Permit returned.");
                Ok(())
            }
            Err(_) => {
                BulkheadUnmatchedRelease {
                    bulkhead: &self.name,
                }
                .emit();
                NoOutstandingPermitSnafu {
                    name: self.name.clone(),
                }
                .fail()
            }
        }
    }

    /// Must be called with the window lock held.
    fn apply(&self, snapshot: &Snapshot) {
        BulkheadWindowClosed {
            metrics: &self.metrics,
            snapshot,
        }
        .emit();

        let old_limit = self.limit();
        let new_limit = self.controller.decide(old_limit, snapshot);
        if new_limit == old_limit {
            return;
        }

        self.limit.store(new_limit, atomic::Ordering::Release);
        BulkheadLimitChanged {
            metrics: &self.metrics,
            old_limit,
            new_limit,
        }
        .emit();

        // Broadcast sends never wait on subscribers.
        self.events
            .publish(LimitChangeEvent::new(&self.name, old_limit, new_limit));
    }

    fn lock_window(&self) -> MutexGuard<'_, SlidingWindow> {
        // The window holds plain counters, so a panic elsewhere cannot leave it inconsistent.
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BulkheadState {
    /// The current concurrency limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The number of calls in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// The number of permits that could be granted.
    pub fn available(&self) -> usize {
        self.available
    }
}

/// A granted permit that remembers when it was granted.
///
/// Dropping it without recording an outcome returns the permit without a sample.
#[derive(Debug)]
#[must_use = "dropping a Permit releases it immediately"]
pub struct Permit {
    pool: Option<Arc<PermitPool>>,
    started_at: Instant,
}

impl Permit {
    /// Time since the permit was granted.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the permit, recording the call with the time elapsed since it was granted.
    pub fn record(self, succeeded: bool) -> Result<(), BulkheadError> {
        let duration = self.elapsed();
        self.record_with_duration(succeeded, duration)
    }

    /// Returns the permit, recording the call with a duration measured by the caller.
    pub fn record_with_duration(
        mut self,
        succeeded: bool,
        duration: Duration,
    ) -> Result<(), BulkheadError> {
        match self.pool.take() {
            Some(pool) => pool.on_outcome(succeeded, duration),
            None => Ok(()),
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            // A permit owns exactly one unit of in-flight, so this cannot underflow.
            let _ = pool.release_permission();
        }
    }
}
