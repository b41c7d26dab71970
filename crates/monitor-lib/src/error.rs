//! Error types surfaced by the monitoring engine

use thiserror::Error;

use crate::models::AlertStatus;

/// Errors returned to callers of lifecycle and query operations.
///
/// Statistical "not enough data" situations never produce an error; the
/// detection is skipped instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("alert not found: {0}")]
    AlertNotFound(String),

    #[error("alert {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: AlertStatus,
        to: AlertStatus,
    },

    #[error("system metrics source failed: {0}")]
    SystemSource(String),

    #[error("subscriber failed: {0}")]
    Subscriber(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
