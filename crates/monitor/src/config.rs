//! Daemon configuration

use std::time::Duration;

use anyhow::Result;
use monitor_lib::EngineConfig;
use serde::Deserialize;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Name attached to every structured log line
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Maintenance tick interval in seconds
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,

    /// Retention for resolved/muted alerts; unset keeps them forever
    #[serde(default)]
    pub alert_retention_secs: Option<u64>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "metrics-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_maintenance_interval() -> u64 {
    10
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            maintenance_interval_secs: default_maintenance_interval(),
            alert_retention_secs: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from `MONITOR_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        let config = EngineConfig::default().with_maintenance_interval(Duration::from_secs(
            self.maintenance_interval_secs.max(1),
        ));

        match self.alert_retention_secs {
            Some(secs) => config.with_alert_retention(Duration::from_secs(secs)),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_terminal_alerts() {
        let config = MonitorConfig::default();
        assert_eq!(config.api_port, 8080);

        let engine = config.to_engine_config();
        assert_eq!(engine.maintenance_interval, Duration::from_secs(10));
        assert!(engine.alert_retention.is_none());
    }

    #[test]
    fn test_retention_is_forwarded() {
        let config = MonitorConfig {
            alert_retention_secs: Some(3600),
            maintenance_interval_secs: 0,
            ..MonitorConfig::default()
        };

        let engine = config.to_engine_config();
        assert_eq!(engine.alert_retention, Some(Duration::from_secs(3600)));
        assert_eq!(engine.maintenance_interval, Duration::from_secs(1));
    }
}
