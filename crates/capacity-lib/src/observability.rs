//! Observability for the capacity exporter
//!
//! Provides:
//! - Per-service capacity gauges, published atomically per service
//! - Exporter self-metrics (cycle latency, failures, fetch errors)
//! - Structured JSON logging with tracing

use crate::inventory::FetchFailure;
use crate::models::ServiceCapacity;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry,
};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

/// Metric namespace shared by every series this exporter emits
pub const METRIC_NAMESPACE: &str = "chain_capacity";

/// Label carrying the service name on per-service gauges
pub const SERVICE_LABEL: &str = "namespace";

/// Cycles are dominated by API round trips, so buckets reach into seconds
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Name, help and extractor for each per-service gauge; `None` removes the series
type GaugeSpec = (&'static str, &'static str, fn(&ServiceCapacity) -> Option<f64>);

const SERVICE_GAUGES: &[GaugeSpec] = &[
    ("raw_request_rate", "Request rate as reported by the traffic source", |s| {
        Some(s.traffic.raw_rate)
    }),
    ("adjusted_request_rate", "Request rate after success and shared-path adjustment", |s| {
        Some(s.traffic.adjusted_rate as f64)
    }),
    ("pods", "Running pods of the service deployment", |s| {
        Some(s.resources.pods as f64)
    }),
    ("cpu_millicores_per_request", "Full-chain CPU per unit of adjusted request rate", |s| {
        Some(s.unit_cost.cpu_millis)
    }),
    ("memory_bytes_per_request", "Full-chain memory per unit of adjusted request rate", |s| {
        Some(s.unit_cost.memory_bytes)
    }),
    ("additional_pods", "Pods that still fit on eligible nodes with their full chain", |s| {
        Some(s.additional_pods as f64)
    }),
    ("full_chain_cpu_millicores", "CPU of the service plus its weighted dependencies", |s| {
        Some(s.resources.full_chain.cpu_millis as f64)
    }),
    ("full_chain_memory_bytes", "Memory of the service plus its weighted dependencies", |s| {
        Some(s.resources.full_chain.memory_bytes as f64)
    }),
    ("really_occupied_cpu_millicores", "Larger of used and requested CPU", |s| {
        Some(s.resources.really_occupied.cpu_millis as f64)
    }),
    ("really_occupied_memory_bytes", "Larger of used and requested memory", |s| {
        Some(s.resources.really_occupied.memory_bytes as f64)
    }),
    ("allocatable_cpu_millicores", "Allocatable CPU across eligible nodes", |s| {
        Some(s.resources.allocatable.cpu_millis as f64)
    }),
    ("allocatable_memory_bytes", "Allocatable memory across eligible nodes", |s| {
        Some(s.resources.allocatable.memory_bytes as f64)
    }),
    ("ingress_multiplier", "Share of total frontend traffic entering through the service", |s| {
        s.traffic.ingress_multiplier
    }),
];

/// Per-service capacity gauges
///
/// All gauges of one service are replaced under a single write lock and
/// gathered under the read lock, so a scrape never sees a service half
/// updated. Cheap to clone; clones share the same series.
#[derive(Clone)]
pub struct CapacityGauges {
    gauges: Arc<RwLock<Vec<GaugeVec>>>,
    descs: Vec<Desc>,
}

impl CapacityGauges {
    pub fn new() -> prometheus::Result<Self> {
        let gauges = SERVICE_GAUGES
            .iter()
            .map(|(name, help, _)| {
                GaugeVec::new(
                    Opts::new(*name, *help).namespace(METRIC_NAMESPACE),
                    &[SERVICE_LABEL],
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        let descs = gauges
            .iter()
            .flat_map(|g| g.desc().into_iter().cloned())
            .collect();

        Ok(Self {
            gauges: Arc::new(RwLock::new(gauges)),
            descs,
        })
    }

    /// Register with a registry; the exporter uses the default one
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.clone()))
    }

    /// Replace every gauge of one service
    pub fn publish(&self, service: &ServiceCapacity) {
        let gauges = self.gauges.write().unwrap_or_else(PoisonError::into_inner);

        for (vec, (_, _, extract)) in gauges.iter().zip(SERVICE_GAUGES) {
            match extract(service) {
                Some(value) => vec.with_label_values(&[service.name.as_str()]).set(value),
                None => {
                    // absent series is expected when the service never had one
                    let _ = vec.remove_label_values(&[service.name.as_str()]);
                }
            }
        }
    }

    /// Current value of one gauge, for tests and the CLI
    pub fn value(&self, gauge: &str, service: &str) -> Option<f64> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        let index = SERVICE_GAUGES.iter().position(|(name, _, _)| *name == gauge)?;

        let families = gauges[index].collect();

        families
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == SERVICE_LABEL && l.get_value() == service)
            })
            .map(|metric| metric.get_gauge().get_value())
    }
}

impl Collector for CapacityGauges {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let gauges = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        gauges.iter().flat_map(|g| g.collect()).collect()
    }
}

/// Global self-metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_completed: IntCounter,
    cycles_failed: IntCounter,
    fetch_errors: IntCounterVec,
    services_published: IntGauge,
    last_success_timestamp: Gauge,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "chain_capacity_cycle_duration_seconds",
                "Time spent on one collection and computation cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_completed: register_int_counter!(
                "chain_capacity_cycles_completed_total",
                "Cycles whose figures were published"
            )
            .expect("Failed to register cycles_completed"),

            cycles_failed: register_int_counter!(
                "chain_capacity_cycles_failed_total",
                "Cycles aborted by a dependency graph error"
            )
            .expect("Failed to register cycles_failed"),

            fetch_errors: register_int_counter_vec!(
                "chain_capacity_fetch_errors_total",
                "Collaborator fetches recovered as empty values",
                &["component"]
            )
            .expect("Failed to register fetch_errors"),

            services_published: register_int_gauge!(
                "chain_capacity_services_published",
                "Services published by the last successful cycle"
            )
            .expect("Failed to register services_published"),

            last_success_timestamp: register_gauge!(
                "chain_capacity_last_success_timestamp_seconds",
                "Unix time of the last successful cycle"
            )
            .expect("Failed to register last_success_timestamp"),
        }
    }
}

/// Exporter self-metrics
///
/// A lightweight handle to the global instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Record a published cycle
    pub fn record_cycle_success(&self, services: usize) {
        let inner = self.inner();
        inner.cycles_completed.inc();
        inner.services_published.set(services as i64);
        inner
            .last_success_timestamp
            .set(chrono::Utc::now().timestamp() as f64);
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    pub fn inc_fetch_errors(&self, component: &str) {
        self.inner()
            .fetch_errors
            .with_label_values(&[component])
            .inc();
    }

    pub fn cycles_completed(&self) -> u64 {
        self.inner().cycles_completed.get()
    }

    pub fn cycles_failed(&self) -> u64 {
        self.inner().cycles_failed.get()
    }
}

/// Structured logger for exporter events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, services: usize, interval_secs: u64) {
        info!(
            event = "exporter_started",
            instance = %self.instance,
            exporter_version = %version,
            services = services,
            interval_secs = interval_secs,
            "Capacity exporter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Capacity exporter shutting down"
        );
    }

    pub fn log_cycle_complete(&self, duration_secs: f64, services: usize, fetch_failures: usize) {
        if fetch_failures == 0 {
            info!(
                event = "cycle_complete",
                instance = %self.instance,
                duration_secs = duration_secs,
                services = services,
                "Capacity cycle published"
            );
        } else {
            warn!(
                event = "cycle_complete",
                instance = %self.instance,
                duration_secs = duration_secs,
                services = services,
                fetch_failures = fetch_failures,
                "Capacity cycle published with partial data"
            );
        }
    }

    pub fn log_cycle_failed(&self, reason: &str) {
        error!(
            event = "cycle_failed",
            instance = %self.instance,
            reason = %reason,
            "Capacity cycle aborted, keeping previous figures"
        );
    }

    pub fn log_fetch_failure(&self, failure: &FetchFailure) {
        warn!(
            event = "fetch_failed",
            instance = %self.instance,
            component = %failure.component,
            scope = %failure.scope,
            error = %failure.error,
            "Collaborator fetch failed, using empty values for this cycle"
        );
    }

    pub fn log_service_capacity(&self, service: &ServiceCapacity) {
        debug!(
            event = "service_capacity",
            instance = %self.instance,
            namespace = %service.name,
            deployment = %service.deployment,
            pods = service.resources.pods,
            adjusted_rate = service.traffic.adjusted_rate,
            full_chain_cpu_millicores = service.resources.full_chain.cpu_millis,
            full_chain_memory_bytes = service.resources.full_chain.memory_bytes,
            additional_pods = service.additional_pods,
            "Service capacity computed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceQuantity, ServiceCapacity, TrafficState, UnitCost};

    fn service(name: &str, multiplier: Option<f64>) -> ServiceCapacity {
        let mut service = ServiceCapacity {
            name: name.to_string(),
            deployment: format!("{name}-deployment"),
            traffic: TrafficState {
                raw_rate: 1200.0,
                adjusted_rate: 600,
                ingress_multiplier: multiplier,
            },
            unit_cost: UnitCost {
                cpu_millis: 7.8,
                memory_bytes: 6.5,
            },
            additional_pods: 6,
            ..Default::default()
        };
        service.resources.pods = 2;
        service.resources.full_chain = ResourceQuantity::new(4680, 3920);
        service
    }

    #[test]
    fn test_publish_sets_service_gauges() {
        let gauges = CapacityGauges::new().unwrap();
        gauges.publish(&service("bid", Some(0.6)));

        assert_eq!(gauges.value("adjusted_request_rate", "bid"), Some(600.0));
        assert_eq!(gauges.value("additional_pods", "bid"), Some(6.0));
        assert_eq!(gauges.value("full_chain_cpu_millicores", "bid"), Some(4680.0));
        assert_eq!(gauges.value("ingress_multiplier", "bid"), Some(0.6));
        assert_eq!(gauges.value("pods", "seller"), None);
    }

    #[test]
    fn test_missing_multiplier_removes_series() {
        let gauges = CapacityGauges::new().unwrap();
        gauges.publish(&service("bid", Some(0.6)));
        gauges.publish(&service("bid", None));

        assert_eq!(gauges.value("ingress_multiplier", "bid"), None);
        assert_eq!(gauges.value("pods", "bid"), Some(2.0));
    }

    #[test]
    fn test_gauges_gather_through_registry() {
        let registry = Registry::new();
        let gauges = CapacityGauges::new().unwrap();
        gauges.register(&registry).unwrap();
        gauges.publish(&service("bid", Some(0.6)));

        let families = registry.gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        assert!(names.contains(&"chain_capacity_adjusted_request_rate"));
        assert!(names.contains(&"chain_capacity_cpu_millicores_per_request"));
        assert_eq!(
            families[0].get_metric()[0].get_label()[0].get_name(),
            SERVICE_LABEL
        );
    }

    #[test]
    fn test_double_registration_is_rejected() {
        let registry = Registry::new();
        let gauges = CapacityGauges::new().unwrap();

        gauges.register(&registry).unwrap();
        assert!(gauges.register(&registry).is_err());
    }

    #[test]
    fn test_exporter_metrics_handle() {
        let metrics = ExporterMetrics::new();
        let before = metrics.cycles_completed();

        metrics.observe_cycle_duration(0.4);
        metrics.record_cycle_success(5);
        metrics.inc_fetch_errors("traffic");

        assert!(metrics.cycles_completed() > before);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("capacity-exporter-0");
        assert_eq!(logger.instance, "capacity-exporter-0");
    }
}
