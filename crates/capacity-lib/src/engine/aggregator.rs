//! Resource aggregation
//!
//! Sums capacity, reservations and live usage for one service over its
//! eligible nodes. `really_occupied` counts the larger of usage and the
//! deployment's reservation per resource: bursting pods take what they use,
//! idle pods still hold their requests.

use crate::models::{ClusterSnapshot, DeploymentInfo, NodeInfo, ResourceQuantity, ServiceResourceState};
use std::collections::HashSet;

/// Where a service's workload lives in the snapshot
#[derive(Debug, Clone, Copy)]
pub struct WorkloadRef<'a> {
    pub namespace: &'a str,
    pub deployment: &'a str,
}

impl WorkloadRef<'_> {
    fn owns_pod(&self, namespace: &str, pod_name: &str) -> bool {
        namespace == self.namespace && pod_name.starts_with(self.deployment)
    }
}

/// Find the service's deployment in the snapshot
pub fn find_deployment<'a>(
    snapshot: &'a ClusterSnapshot,
    workload: WorkloadRef<'_>,
) -> Option<&'a DeploymentInfo> {
    snapshot
        .deployments
        .iter()
        .find(|d| d.namespace == workload.namespace && d.name == workload.deployment)
}

/// Declared requests of the deployment across all replicas
pub fn deployment_requested(deployment: Option<&DeploymentInfo>) -> ResourceQuantity {
    deployment
        .map(|d| d.replica_requests * d.replicas.max(0))
        .unwrap_or_default()
}

/// Requests of every pod scheduled on an eligible node
pub fn total_requested(snapshot: &ClusterSnapshot, eligible: &[&NodeInfo]) -> ResourceQuantity {
    let names: HashSet<&str> = eligible.iter().map(|n| n.name.as_str()).collect();

    snapshot
        .pods
        .iter()
        .filter(|pod| {
            pod.node_name
                .as_deref()
                .is_some_and(|node| names.contains(node))
        })
        .map(|pod| pod.requests)
        .sum()
}

/// Live usage of the service's own pods
pub fn used(snapshot: &ClusterSnapshot, workload: WorkloadRef<'_>) -> ResourceQuantity {
    snapshot
        .usage
        .iter()
        .filter(|pod| workload.owns_pod(&pod.namespace, &pod.name))
        .map(|pod| pod.total())
        .sum()
}

/// Number of pods belonging to the service.
///
/// Counts every pod matching the deployment prefix, including pending pods
/// with no node yet; unlike the requested and used sums it is not scoped to
/// eligible nodes.
pub fn pods_amount(snapshot: &ClusterSnapshot, workload: WorkloadRef<'_>) -> i64 {
    snapshot
        .pods
        .iter()
        .filter(|pod| workload.owns_pod(&pod.namespace, &pod.name))
        .count() as i64
}

/// Build the per-service resource state; `full_chain` is filled in later
pub fn aggregate(
    snapshot: &ClusterSnapshot,
    eligible: &[&NodeInfo],
    workload: WorkloadRef<'_>,
) -> ServiceResourceState {
    let allocatable = eligible.iter().map(|node| node.allocatable).sum();
    let deployment_requested = deployment_requested(find_deployment(snapshot, workload));
    let used = used(snapshot, workload);

    ServiceResourceState {
        allocatable,
        total_requested: total_requested(snapshot, eligible),
        deployment_requested,
        used,
        really_occupied: used.componentwise_max(deployment_requested),
        full_chain: ResourceQuantity::ZERO,
        pods: pods_amount(snapshot, workload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerUsage, PodInfo, PodUsage};

    fn node(name: &str, cpu: i64, mem: i64) -> NodeInfo {
        NodeInfo {
            name: name.to_string(),
            labels: Default::default(),
            taints: vec![],
            allocatable: ResourceQuantity::new(cpu, mem),
        }
    }

    fn pod(name: &str, namespace: &str, node: &str, cpu: i64, mem: i64) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: namespace.to_string(),
            node_name: Some(node.to_string()),
            requests: ResourceQuantity::new(cpu, mem),
        }
    }

    fn usage(name: &str, namespace: &str, cpu: i64, mem: i64) -> PodUsage {
        PodUsage {
            name: name.to_string(),
            namespace: namespace.to_string(),
            containers: vec![
                ContainerUsage {
                    name: "app".to_string(),
                    usage: ResourceQuantity::new(cpu / 2, mem / 2),
                },
                ContainerUsage {
                    name: "sidecar".to_string(),
                    usage: ResourceQuantity::new(cpu - cpu / 2, mem - mem / 2),
                },
            ],
        }
    }

    fn snapshot() -> ClusterSnapshot {
        ClusterSnapshot {
            nodes: vec![node("n1", 4000, 8000), node("n2", 4000, 8000), node("n3", 2000, 4000)],
            pods: vec![
                pod("web-deployment-abc", "web", "n1", 200, 300),
                pod("web-deployment-def", "web", "n2", 200, 300),
                pod("other-xyz", "other", "n3", 1000, 1000),
                PodInfo {
                    name: "web-deployment-pending".to_string(),
                    namespace: "web".to_string(),
                    node_name: None,
                    requests: ResourceQuantity::new(200, 300),
                },
            ],
            deployments: vec![DeploymentInfo {
                name: "web-deployment".to_string(),
                namespace: "web".to_string(),
                replicas: 3,
                replica_requests: ResourceQuantity::new(200, 300),
                affinity: vec![],
                tolerations: vec![],
            }],
            usage: vec![
                usage("web-deployment-abc", "web", 500, 100),
                usage("web-deployment-def", "web", 300, 100),
                usage("other-xyz", "other", 900, 900),
            ],
            request_rates: Default::default(),
        }
    }

    const WEB: WorkloadRef<'static> = WorkloadRef {
        namespace: "web",
        deployment: "web-deployment",
    };

    #[test]
    fn test_aggregate_over_eligible_nodes() {
        let snapshot = snapshot();
        let eligible: Vec<&NodeInfo> = snapshot.nodes.iter().take(2).collect();

        let state = aggregate(&snapshot, &eligible, WEB);

        assert_eq!(state.allocatable, ResourceQuantity::new(8000, 16000));
        assert_eq!(state.total_requested, ResourceQuantity::new(400, 600));
        assert_eq!(state.deployment_requested, ResourceQuantity::new(600, 900));
        assert_eq!(state.used, ResourceQuantity::new(800, 200));
        assert_eq!(state.really_occupied, ResourceQuantity::new(800, 900));
        assert_eq!(state.pods, 3);
        assert_eq!(state.full_chain, ResourceQuantity::ZERO);
    }

    #[test]
    fn test_pending_pods_counted_but_not_summed() {
        let snapshot = snapshot();
        let eligible: Vec<&NodeInfo> = snapshot.nodes.iter().collect();

        assert_eq!(pods_amount(&snapshot, WEB), 3);
        // the pending pod has no node, so no eligible node sums its requests
        assert_eq!(
            total_requested(&snapshot, &eligible),
            ResourceQuantity::new(1400, 1600)
        );
    }

    #[test]
    fn test_missing_deployment_counts_usage_only() {
        let snapshot = snapshot();
        let workload = WorkloadRef {
            namespace: "other",
            deployment: "other",
        };

        let state = aggregate(&snapshot, &[], workload);

        assert_eq!(state.deployment_requested, ResourceQuantity::ZERO);
        assert_eq!(state.really_occupied, ResourceQuantity::new(900, 900));
        assert_eq!(state.allocatable, ResourceQuantity::ZERO);
        assert_eq!(state.pods, 1);
    }

    #[test]
    fn test_pods_in_other_namespace_are_ignored() {
        let mut snapshot = snapshot();
        snapshot.usage.push(usage("web-deployment-zzz", "staging", 10_000, 10_000));

        assert_eq!(used(&snapshot, WEB), ResourceQuantity::new(800, 200));
    }
}
