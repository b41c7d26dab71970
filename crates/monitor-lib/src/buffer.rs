//! Bounded per-(metric, source) windows of recent data points
//!
//! Each buffer is a FIFO ring: once it holds `capacity` points the oldest
//! point is evicted before the newest is appended. Buffers are created
//! lazily on the first point for a key and live for the process lifetime.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::config::DEFAULT_BUFFER_CAPACITY;
use crate::models::{MetricDataPoint, MetricKind};

/// Buffer identity
pub type BufferKey = (MetricKind, String);

/// Ring buffer of the most recent points for one metric/source pair
#[derive(Debug, Clone)]
pub struct MetricBuffer {
    points: VecDeque<MetricDataPoint>,
    capacity: usize,
}

impl MetricBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Append a point, evicting the oldest if at capacity
    pub fn push(&mut self, point: MetricDataPoint) {
        while self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// Last `n` points in arrival order (fewer if unavailable)
    pub fn recent(&self, n: usize) -> Vec<MetricDataPoint> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).cloned().collect()
    }

    /// Values of the last `n` points
    pub fn recent_values(&self, n: usize) -> Vec<f64> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip).map(|p| p.value).collect()
    }

    /// Values of up to `n` points preceding the newest one
    pub fn baseline_values(&self, n: usize) -> Vec<f64> {
        let history = self.points.len().saturating_sub(1);
        let skip = history.saturating_sub(n);
        self.points
            .iter()
            .take(history)
            .skip(skip)
            .map(|p| p.value)
            .collect()
    }

    /// Points whose timestamp falls within `window` of `now`
    pub fn within(&self, window: Duration, now: DateTime<Utc>) -> Vec<&MetricDataPoint> {
        let cutoff = cutoff(now, window);
        self.points
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .collect()
    }

    /// Mean of the last `n` values, `None` if the buffer is empty
    pub fn recent_mean(&self, n: usize) -> Option<f64> {
        let values = self.recent_values(n);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Concurrent map of all buffers, keyed by (metric, source)
pub struct BufferRegistry {
    buffers: DashMap<BufferKey, MetricBuffer>,
    capacity: usize,
}

impl BufferRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity,
        }
    }

    /// Append a point and inspect the updated buffer.
    ///
    /// `inspect` runs while the buffer's shard is locked, so it must stay
    /// bounded and must not touch the registry again.
    pub fn ingest_with<R>(
        &self,
        point: MetricDataPoint,
        inspect: impl FnOnce(&MetricBuffer, &MetricDataPoint) -> R,
    ) -> R {
        let key = (point.metric, point.source.clone());
        let mut entry = self.buffers.entry(key).or_insert_with(|| {
            debug!(metric = %point.metric, source = %point.source, "Creating metric buffer");
            MetricBuffer::new(self.capacity)
        });
        let current = point.clone();
        entry.push(point);
        inspect(&entry, &current)
    }

    /// Append a point without inspection
    pub fn ingest(&self, point: MetricDataPoint) {
        self.ingest_with(point, |_, _| ());
    }

    /// Run `f` against the buffer for a key, if it exists
    pub fn with_buffer<R>(
        &self,
        metric: MetricKind,
        source: &str,
        f: impl FnOnce(&MetricBuffer) -> R,
    ) -> Option<R> {
        self.buffers
            .get(&(metric, source.to_string()))
            .map(|buffer| f(&buffer))
    }

    /// Run `f` against every buffer tracking `metric`
    pub fn for_metric(&self, metric: MetricKind, mut f: impl FnMut(&str, &MetricBuffer)) {
        for entry in self.buffers.iter() {
            let (kind, source) = entry.key();
            if *kind == metric {
                f(source, entry.value());
            }
        }
    }

    /// Last `n` points for a key
    pub fn recent(&self, metric: MetricKind, source: &str, n: usize) -> Vec<MetricDataPoint> {
        self.with_buffer(metric, source, |b| b.recent(n))
            .unwrap_or_default()
    }

    /// Number of tracked (metric, source) pairs
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total points held across all buffers
    pub fn total_points(&self) -> usize {
        self.buffers.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

pub(crate) fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| now.checked_sub_signed(w))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
