//! Retained anomaly records

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::buffer::cutoff;
use crate::models::Anomaly;

/// Concurrent set of detected anomalies, keyed by id
#[derive(Default)]
pub struct AnomalyLog {
    anomalies: DashMap<String, Anomaly>,
}

impl AnomalyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, anomaly: Anomaly) {
        self.anomalies.insert(anomaly.id.clone(), anomaly);
    }

    pub fn get(&self, id: &str) -> Option<Anomaly> {
        self.anomalies.get(id).map(|r| r.clone())
    }

    /// Anomalies detected within `window` of `now`, newest first
    pub fn recent(&self, window: Duration, now: DateTime<Utc>) -> Vec<Anomaly> {
        let cutoff = cutoff(now, window);
        let mut recent: Vec<Anomaly> = self
            .anomalies
            .iter()
            .filter(|entry| entry.detected_at >= cutoff)
            .map(|entry| entry.value().clone())
            .collect();
        recent.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        recent
    }

    /// Remove anomalies detected more than `retention` before `now`.
    ///
    /// Returns the number removed. Shards are locked one at a time.
    pub fn prune(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now, retention);
        let before = self.anomalies.len();
        self.anomalies.retain(|_, anomaly| anomaly.detected_at >= cutoff);
        before.saturating_sub(self.anomalies.len())
    }

    pub fn len(&self) -> usize {
        self.anomalies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty()
    }
}
