//! Periodic capacity cycle
//!
//! Every tick collects a fresh snapshot, runs the engine over it and
//! publishes the figures. A dependency graph error skips publication, so the
//! previous figures stay visible until the configuration is fixed.

use crate::config::CapacityConfig;
use crate::engine::{run_cycle, EngineError};
use crate::health::{components, HealthRegistry};
use crate::inventory::{SnapshotCollector, SnapshotOutcome};
use crate::models::CycleReport;
use crate::observability::{CapacityGauges, ExporterMetrics, StructuredLogger};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::info;

/// What one published cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub services: usize,
    pub fetch_failures: usize,
    pub duration: Duration,
}

/// Runs capacity cycles on a fixed interval
pub struct CapacityScheduler {
    config: Arc<CapacityConfig>,
    collector: SnapshotCollector,
    gauges: CapacityGauges,
    health: HealthRegistry,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
    last_report: Arc<RwLock<Option<CycleReport>>>,
}

impl CapacityScheduler {
    pub fn builder() -> CapacitySchedulerBuilder {
        CapacitySchedulerBuilder::new()
    }

    /// Handle to the last published report
    pub fn last_report(&self) -> Arc<RwLock<Option<CycleReport>>> {
        self.last_report.clone()
    }

    /// Run until the shutdown channel fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval_secs,
            services = self.config.namespaces.len(),
            "Starting capacity scheduler"
        );

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // failures are already logged, counted and reflected in health
                    let _ = self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down capacity scheduler");
                    break;
                }
            }
        }
    }

    /// Collect, compute and publish one cycle
    pub async fn run_once(&self) -> Result<CycleSummary, EngineError> {
        let start = Instant::now();

        let outcome = self.collector.collect(&self.config).await;
        self.record_fetch_failures(&outcome).await;

        let report = match run_cycle(&self.config, &outcome.snapshot) {
            Ok(report) => report,
            Err(e) => {
                self.metrics.inc_cycles_failed();
                self.logger.log_cycle_failed(&e.to_string());
                self.health
                    .set_unhealthy(components::ENGINE, e.to_string())
                    .await;
                return Err(e);
            }
        };

        for service in report.services.values() {
            self.gauges.publish(service);
            self.logger.log_service_capacity(service);
        }

        let duration = start.elapsed();
        let summary = CycleSummary {
            services: report.services.len(),
            fetch_failures: outcome.failures.len(),
            duration,
        };

        self.metrics.observe_cycle_duration(duration.as_secs_f64());
        self.metrics.record_cycle_success(summary.services);
        self.health.set_healthy(components::ENGINE).await;
        self.health.record_cycle_success().await;
        self.logger.log_cycle_complete(
            duration.as_secs_f64(),
            summary.services,
            summary.fetch_failures,
        );

        *self.last_report.write().await = Some(report);

        Ok(summary)
    }

    async fn record_fetch_failures(&self, outcome: &SnapshotOutcome) {
        for failure in &outcome.failures {
            self.metrics.inc_fetch_errors(failure.component);
            self.logger.log_fetch_failure(failure);
        }

        for component in [components::INVENTORY, components::TRAFFIC] {
            let failed: Vec<&str> = outcome
                .failures_for(component)
                .map(|f| f.scope.as_str())
                .collect();

            if failed.is_empty() {
                self.health.set_healthy(component).await;
            } else {
                self.health
                    .set_degraded(component, format!("fetch failed for: {}", failed.join(", ")))
                    .await;
            }
        }
    }
}

/// Builder for [`CapacityScheduler`]
pub struct CapacitySchedulerBuilder {
    config: Option<Arc<CapacityConfig>>,
    collector: Option<SnapshotCollector>,
    gauges: Option<CapacityGauges>,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl CapacitySchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            collector: None,
            gauges: None,
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("capacity-exporter"),
        }
    }

    pub fn config(mut self, config: Arc<CapacityConfig>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn collector(mut self, collector: SnapshotCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Gauges to publish into; usually already registered for exposition
    pub fn gauges(mut self, gauges: CapacityGauges) -> Self {
        self.gauges = Some(gauges);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<CapacityScheduler> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("Config is required"))?;
        let collector = self
            .collector
            .ok_or_else(|| anyhow::anyhow!("Snapshot collector is required"))?;
        let gauges = self
            .gauges
            .ok_or_else(|| anyhow::anyhow!("Capacity gauges are required"))?;

        anyhow::ensure!(config.interval_secs > 0, "interval_secs must be positive");

        Ok(CapacityScheduler {
            config,
            collector,
            gauges,
            health: self.health,
            metrics: ExporterMetrics::new(),
            logger: self.logger,
            last_report: Arc::new(RwLock::new(None)),
        })
    }
}

impl Default for CapacitySchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
