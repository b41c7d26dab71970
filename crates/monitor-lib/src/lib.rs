//! Real-time metrics monitoring and alerting engine
//!
//! This crate provides the core functionality for:
//! - Bounded per-(metric, source) buffers of time-stamped points
//! - Z-score anomaly detection against a rolling baseline
//! - SLA compliance over trailing time windows
//! - Static threshold alerts with a de-duplicated alert lifecycle
//! - Background maintenance (anomaly pruning, alert auto-resolution)
//! - Health checks and observability

pub mod alerting;
pub mod anomaly;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod maintenance;
pub mod models;
pub mod observability;
pub mod sla;
pub mod system;

pub use config::EngineConfig;
pub use engine::{MonitoringEngine, MonitoringStats};
pub use error::{MonitorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use system::{SystemMetricsSource, SystemSample};
