//! Snapshot collection
//!
//! Fetches everything one cycle needs and freezes it. A failed fetch never
//! aborts collection: the affected data is left empty (or the rate at 0) and
//! the failure is returned alongside the snapshot.

use super::{ClusterInventory, FetchError, TrafficSource};
use crate::config::CapacityConfig;
use crate::health::components;
use crate::models::ClusterSnapshot;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One recovered fetch failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// Health component the fetch belongs to
    pub component: &'static str,
    /// What was being fetched: "nodes", "pods", or a service name
    pub scope: String,
    pub error: String,
}

impl FetchFailure {
    fn new(component: &'static str, scope: impl Into<String>, error: FetchError) -> Self {
        Self {
            component,
            scope: scope.into(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.component, self.scope, self.error)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotOutcome {
    pub snapshot: ClusterSnapshot,
    pub failures: Vec<FetchFailure>,
}

impl SnapshotOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures belonging to one health component
    pub fn failures_for(&self, component: &str) -> impl Iterator<Item = &FetchFailure> + '_ {
        let component = component.to_string();
        self.failures
            .iter()
            .filter(move |f| f.component == component)
    }
}

/// Builds a [`ClusterSnapshot`] from the collaborators
#[derive(Clone)]
pub struct SnapshotCollector {
    inventory: Arc<dyn ClusterInventory>,
    traffic: Arc<dyn TrafficSource>,
}

impl SnapshotCollector {
    pub fn new(inventory: Arc<dyn ClusterInventory>, traffic: Arc<dyn TrafficSource>) -> Self {
        Self { inventory, traffic }
    }

    pub async fn collect(&self, config: &CapacityConfig) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();

        let (nodes, pods) = tokio::join!(self.inventory.list_nodes(), self.inventory.list_pods());

        match nodes {
            Ok(nodes) => outcome.snapshot.nodes = nodes,
            Err(e) => outcome
                .failures
                .push(FetchFailure::new(components::INVENTORY, "nodes", e)),
        }

        match pods {
            Ok(pods) => outcome.snapshot.pods = pods,
            Err(e) => outcome
                .failures
                .push(FetchFailure::new(components::INVENTORY, "pods", e)),
        }

        for service in &config.namespaces {
            let namespace = service.name.as_str();

            let (deployments, usage) = tokio::join!(
                self.inventory.list_deployments(namespace),
                self.inventory.list_pod_usage(namespace)
            );

            match deployments {
                Ok(deployments) => outcome.snapshot.deployments.extend(deployments),
                Err(e) => outcome
                    .failures
                    .push(FetchFailure::new(components::INVENTORY, namespace, e)),
            }

            match usage {
                Ok(usage) => outcome.snapshot.usage.extend(usage),
                Err(e) => outcome
                    .failures
                    .push(FetchFailure::new(components::INVENTORY, namespace, e)),
            }

            let rate = match service.traffic_query(&config.prometheus) {
                Some(query) => match self.traffic.current_rate(&query).await {
                    Ok(rate) => rate,
                    Err(e) => {
                        outcome
                            .failures
                            .push(FetchFailure::new(components::TRAFFIC, namespace, e));
                        0.0
                    }
                },
                None => 0.0,
            };
            outcome.snapshot.request_rates.insert(service.name.clone(), rate);
        }

        debug!(
            nodes = outcome.snapshot.nodes.len(),
            pods = outcome.snapshot.pods.len(),
            deployments = outcome.snapshot.deployments.len(),
            failures = outcome.failures.len(),
            "Snapshot collected"
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::async_trait;
    use crate::models::{DeploymentInfo, NodeInfo, PodInfo, PodUsage, ResourceQuantity};
    use std::collections::HashMap;
    use std::time::Duration;

    struct MockInventory {
        broken_namespace: Option<&'static str>,
        nodes_down: bool,
    }

    #[async_trait]
    impl ClusterInventory for MockInventory {
        async fn list_nodes(&self) -> Result<Vec<NodeInfo>, FetchError> {
            if self.nodes_down {
                return Err(FetchError::Timeout(Duration::from_secs(5)));
            }
            Ok(vec![NodeInfo {
                name: "n1".into(),
                labels: Default::default(),
                taints: vec![],
                allocatable: ResourceQuantity::new(4000, 8000),
            }])
        }

        async fn list_pods(&self) -> Result<Vec<PodInfo>, FetchError> {
            Ok(vec![])
        }

        async fn list_deployments(
            &self,
            namespace: &str,
        ) -> Result<Vec<DeploymentInfo>, FetchError> {
            if self.broken_namespace == Some(namespace) {
                return Err(FetchError::Malformed("boom".into()));
            }
            Ok(vec![DeploymentInfo {
                name: format!("{namespace}-deployment"),
                namespace: namespace.to_string(),
                replicas: 1,
                replica_requests: ResourceQuantity::new(100, 100),
                affinity: vec![],
                tolerations: vec![],
            }])
        }

        async fn list_pod_usage(&self, _namespace: &str) -> Result<Vec<PodUsage>, FetchError> {
            Ok(vec![])
        }
    }

    struct MockTraffic {
        rates: HashMap<String, f64>,
    }

    #[async_trait]
    impl TrafficSource for MockTraffic {
        async fn current_rate(&self, query: &str) -> Result<f64, FetchError> {
            self.rates
                .get(query)
                .copied()
                .ok_or_else(|| FetchError::Malformed(format!("unknown query {query}")))
        }
    }

    const CONFIG: &str = r#"
prometheus:
  templates:
    rps: 'sum(rate(requests{ns="$variable"}[1m]))'
namespaces:
  - name: web
    traffic: { template: rps, variable: web }
  - name: api
    traffic: { query: 'api_rps' }
  - name: db
"#;

    fn collector(inventory: MockInventory, rates: &[(&str, f64)]) -> SnapshotCollector {
        let rates = rates.iter().map(|(q, r)| (q.to_string(), *r)).collect();
        SnapshotCollector::new(Arc::new(inventory), Arc::new(MockTraffic { rates }))
    }

    #[tokio::test]
    async fn test_collects_everything() {
        let config = CapacityConfig::from_yaml(CONFIG).unwrap();
        let collector = collector(
            MockInventory {
                broken_namespace: None,
                nodes_down: false,
            },
            &[("sum(rate(requests{ns=\"web\"}[1m]))", 120.0), ("api_rps", 80.0)],
        );

        let outcome = collector.collect(&config).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.snapshot.nodes.len(), 1);
        assert_eq!(outcome.snapshot.deployments.len(), 3);
        assert_eq!(outcome.snapshot.request_rates["web"], 120.0);
        assert_eq!(outcome.snapshot.request_rates["api"], 80.0);
        // no binding, no query
        assert_eq!(outcome.snapshot.request_rates["db"], 0.0);
    }

    #[tokio::test]
    async fn test_failures_are_recovered_per_service() {
        let config = CapacityConfig::from_yaml(CONFIG).unwrap();
        let collector = collector(
            MockInventory {
                broken_namespace: Some("api"),
                nodes_down: false,
            },
            &[("api_rps", 80.0)],
        );

        let outcome = collector.collect(&config).await;

        assert_eq!(outcome.failures.len(), 2);
        assert_eq!(outcome.failures_for(components::INVENTORY).count(), 1);
        assert_eq!(outcome.failures_for(components::TRAFFIC).next().unwrap().scope, "web");

        // other services still have their data
        assert_eq!(outcome.snapshot.deployments.len(), 2);
        assert_eq!(outcome.snapshot.request_rates["web"], 0.0);
        assert_eq!(outcome.snapshot.request_rates["api"], 80.0);
    }

    #[tokio::test]
    async fn test_node_failure_leaves_nodes_empty() {
        let config = CapacityConfig::from_yaml(CONFIG).unwrap();
        let collector = collector(
            MockInventory {
                broken_namespace: None,
                nodes_down: true,
            },
            &[],
        );

        let outcome = collector.collect(&config).await;

        assert!(outcome.snapshot.nodes.is_empty());
        assert_eq!(outcome.failures[0].scope, "nodes");
        assert!(outcome.failures[0].to_string().starts_with("inventory (nodes)"));
    }
}
