//! Anomaly detection over metric buffers
//!
//! This module provides:
//! - Z-score classification of the newest point against a rolling baseline
//! - A retained log of detected anomalies with time-based pruning

mod detector;
mod log;

pub use detector::{AnomalyDetector, RollingStats};
pub use log::AnomalyLog;
