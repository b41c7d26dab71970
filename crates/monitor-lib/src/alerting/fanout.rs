//! Best-effort notification of subscribers
//!
//! Each callback is invoked independently. A callback that returns an
//! error or panics is logged and skipped; it never affects the caller or
//! the remaining subscribers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use crate::error::MonitorError;
use crate::observability::StructuredLogger;

/// Subscriber callback
pub type Callback<T> = Arc<dyn Fn(&T) -> Result<(), MonitorError> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

/// Outcome of one fan-out round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Registered observers of one event type
pub struct Subscribers<T> {
    topic: &'static str,
    logger: StructuredLogger,
    entries: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> Subscribers<T> {
    pub fn new(topic: &'static str, logger: StructuredLogger) -> Self {
        Self {
            topic,
            logger,
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) -> Result<(), MonitorError> + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(callback);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    /// Returns true if the subscription existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(sid, _)| *sid != id);
        entries.len() < before
    }

    /// Deliver `item` to every subscriber.
    ///
    /// Callbacks run on a snapshot, outside the registry lock.
    pub fn notify(&self, item: &T) -> FanoutReport {
        let snapshot: Vec<(SubscriptionId, Callback<T>)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut report = FanoutReport::default();
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(item))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    self.logger
                        .log_subscriber_failure(self.topic, id.0, &e.to_string());
                }
                Err(_) => {
                    report.failed += 1;
                    self.logger
                        .log_subscriber_failure(self.topic, id.0, "callback panicked");
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
