//! Abstract source of host resource figures
//!
//! The engine never samples the platform itself. Hosts plug in an
//! implementation and call `MonitoringEngine::record_system_metrics`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One CPU/memory reading, both in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Trait for system metrics providers
#[async_trait]
pub trait SystemMetricsSource: Send + Sync {
    /// Take a reading
    async fn sample(&self) -> Result<SystemSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(SystemSample);

    #[async_trait]
    impl SystemMetricsSource for Constant {
        async fn sample(&self) -> Result<SystemSample> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_source_as_trait_object() {
        let reading = SystemSample {
            cpu_percent: 12.5,
            memory_percent: 48.0,
        };
        let source: Box<dyn SystemMetricsSource> = Box::new(Constant(reading));

        let sample = tokio_test::block_on(source.sample()).unwrap();
        assert_eq!(sample, reading);
    }
}
