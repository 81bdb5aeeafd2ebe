//! Capacity exporter
//!
//! Runs the capacity scheduler on a fixed interval and serves the per-service
//! gauges, health and readiness over HTTP.

use anyhow::{Context, Result};
use capacity_exporter::{
    api,
    config::{LogFormat, RuntimeConfig},
};
use capacity_lib::{
    engine,
    health::HealthRegistry,
    inventory::{KubeInventory, PrometheusClient, SnapshotCollector},
    observability::{CapacityGauges, ExporterMetrics, StructuredLogger},
    CapacityConfig, CapacityScheduler,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().pretty()))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = RuntimeConfig::load().context("Invalid EXPORTER_* settings")?;
    init_tracing(runtime.log_format);

    info!(config_path = %runtime.config_path, "Starting capacity-exporter");

    let config = Arc::new(
        CapacityConfig::load(&runtime.config_path)
            .with_context(|| format!("Failed to load {}", runtime.config_path))?,
    );

    // graph errors surface per cycle; warn early so they are not a surprise
    if let Err(e) = engine::resolve(&config.dependency_graph()) {
        warn!(error = %e, "Dependency graph is invalid, no figures will be published");
    }

    let health_registry = HealthRegistry::with_default_components().await;

    let gauges = CapacityGauges::new()?;
    gauges.register(prometheus::default_registry())?;
    ExporterMetrics::new();

    let logger = StructuredLogger::new(&runtime.instance);
    logger.log_startup(EXPORTER_VERSION, config.namespaces.len(), config.interval_secs);

    let inventory = KubeInventory::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let traffic = PrometheusClient::new(&config.prometheus)?;
    let collector = SnapshotCollector::new(Arc::new(inventory), Arc::new(traffic));

    let scheduler = CapacityScheduler::builder()
        .config(config.clone())
        .collector(collector)
        .gauges(gauges)
        .health(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(health_registry));
    let mut api_handle = tokio::spawn(api::serve(
        config.exporter.clone(),
        app_state,
        shutdown_tx.subscribe(),
    ));

    let server_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            None
        }
        exit = &mut api_handle => {
            logger.log_shutdown("API server exited");
            Some(exit)
        }
    };

    // receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(());
    scheduler_handle.await?;

    match server_exit {
        None => api_handle.await??,
        Some(exit) => {
            exit?.context("API server failed")?;
            anyhow::bail!("API server stopped before shutdown was requested");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
