//! Metrics monitor daemon
//!
//! Hosts a single monitoring engine, runs its maintenance loop and serves
//! health, stats and Prometheus metrics over HTTP.

use std::sync::Arc;

use anyhow::Result;
use monitor_lib::{HealthRegistry, MonitoringEngine};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metrics-monitor");

    let config = config::MonitorConfig::load()?;
    info!(
        instance = %config.instance_name,
        port = config.api_port,
        maintenance_interval_secs = config.maintenance_interval_secs,
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    let engine = MonitoringEngine::with_instance(
        config.to_engine_config(),
        config.instance_name.clone(),
        health_registry.clone(),
    );

    // Delivery transports live outside the daemon; alerts go to the log.
    engine.subscribe_to_alerts(|alert| {
        warn!(
            event = "alert_delivered",
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            "Alert raised"
        );
        Ok(())
    });

    engine.start().await;

    let app_state = Arc::new(api::AppState::new(health_registry, engine.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("SIGINT received, shutting down");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => warn!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    engine.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}
