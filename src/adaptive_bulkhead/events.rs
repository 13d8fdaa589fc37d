//! Fire-and-forget notification of limit changes.
//!
//! Publishing never blocks and never fails the call path that triggered it. Each subscriber
//! has its own bounded buffer on a `tokio::sync::broadcast` channel. A subscriber that falls
//! further behind than that buffer misses the oldest events and nobody else is affected.

use std::{
    panic::{self, AssertUnwindSafe},
    time::SystemTime,
};

use tokio::{
    sync::broadcast::{self, Receiver, Sender, error::RecvError},
    task::JoinHandle,
};

/// The direction of a limit change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitChangeKind {
    Increased,
    Decreased,
}

/// A change of a bulkhead's concurrency limit, published after a window closes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitChangeEvent {
    bulkhead: String,
    old_limit: usize,
    new_limit: usize,
    occurred_at: SystemTime,
}

impl LimitChangeEvent {
    pub(crate) fn new(bulkhead: &str, old_limit: usize, new_limit: usize) -> Self {
        Self {
            bulkhead: bulkhead.to_owned(),
            old_limit,
            new_limit,
            occurred_at: SystemTime::now(),
        }
    }

    /// Name of the bulkhead whose limit changed.
    pub fn bulkhead(&self) -> &str {
        &self.bulkhead
    }

    pub const fn old_limit(&self) -> usize {
        self.old_limit
    }

    pub const fn new_limit(&self) -> usize {
        self.new_limit
    }

    /// Wall-clock time at which the change was applied.
    pub const fn occurred_at(&self) -> SystemTime {
        self.occurred_at
    }

    pub fn kind(&self) -> LimitChangeKind {
        if self.new_limit > self.old_limit {
            LimitChangeKind::Increased
        } else {
            LimitChangeKind::Decreased
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventChannel {
    sender: Sender<LimitChangeEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Hands `event` to every current subscriber without waiting for any of them.
    pub fn publish(&self, event: LimitChangeEvent) {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "Published limit change."),
            // No subscribers is the common case, not a failure.
            Err(_) => trace!("Limit change published with no subscribers."),
        }
    }

    /// A receiver of every event published from now on.
    pub fn subscribe(&self) -> Receiver<LimitChangeEvent> {
        self.sender.subscribe()
    }

    /// Runs `handler` on a dedicated task for every event published from now on.
    ///
    /// A panicking handler skips that event only; it stays subscribed. Delivery stops when
    /// the returned [`Subscription`] is dropped or unsubscribed.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn on_limit_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&LimitChangeEvent) + Send + Sync + 'static,
    {
        let mut receiver = self.sender.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if panic::catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                            warn!(
                                message = "Limit change subscriber panicked; event skipped.",
                                bulkhead = event.bulkhead(),
                            );
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            message = "Limit change subscriber fell behind; events dropped.",
                            skipped,
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Subscription { task: Some(task) }
    }

    /// Number of live subscribers, handler-based or receiver-based.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Keeps a handler registered via [`EventChannel::on_limit_change`] alive.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
