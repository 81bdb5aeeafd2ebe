//! Cluster inventory from the Kubernetes API
//!
//! Nodes, pods and deployments come from the typed core/apps APIs; live
//! usage comes from `metrics.k8s.io/v1beta1` PodMetrics, which k8s-openapi
//! does not ship, so the resource is declared here.

use super::quantity::{parse_cpu_millis, parse_memory_bytes};
use super::{async_trait, ClusterInventory, FetchError};
use crate::models::{
    AffinityExpression, ContainerUsage, DeploymentInfo, NodeInfo, PodInfo, PodUsage,
    ResourceQuantity, Taint, Toleration, TolerationOperator,
};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Node, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Kubernetes-backed [`ClusterInventory`]
#[derive(Clone)]
pub struct KubeInventory {
    client: Client,
}

impl KubeInventory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client from in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, FetchError> {
        let client = Client::try_default().await?;
        debug!("Kubernetes client initialized");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterInventory for KubeInventory {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, FetchError> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let list = nodes.list(&ListParams::default()).await?;

        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items.iter().map(map_node).collect())
    }

    async fn list_pods(&self) -> Result<Vec<PodInfo>, FetchError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods.list(&ListParams::default()).await?;

        debug!(count = list.items.len(), "Listed pods");
        Ok(list.items.iter().map(map_pod).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, FetchError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments.list(&ListParams::default()).await?;

        debug!(namespace, count = list.items.len(), "Listed deployments");
        Ok(list.items.iter().map(map_deployment).collect())
    }

    async fn list_pod_usage(&self, namespace: &str) -> Result<Vec<PodUsage>, FetchError> {
        let metrics: Api<PodMetrics> = Api::namespaced(self.client.clone(), namespace);
        let list = metrics.list(&ListParams::default()).await?;

        debug!(namespace, count = list.items.len(), "Listed pod metrics");
        Ok(list.items.iter().map(map_pod_metrics).collect())
    }
}

fn resources(map: Option<&BTreeMap<String, Quantity>>) -> ResourceQuantity {
    let get = |key: &str, parse: fn(&str) -> Option<i64>| {
        map.and_then(|m| m.get(key))
            .and_then(|q| parse(&q.0))
            .unwrap_or(0)
    };

    ResourceQuantity::new(
        get("cpu", parse_cpu_millis),
        get("memory", parse_memory_bytes),
    )
}

fn container_requests(containers: &[Container]) -> ResourceQuantity {
    containers
        .iter()
        .map(|c| resources(c.resources.as_ref().and_then(|r| r.requests.as_ref())))
        .sum()
}

pub(crate) fn map_node(node: &Node) -> NodeInfo {
    let status = node.status.as_ref();
    let allocatable = status.and_then(|s| s.allocatable.as_ref().or(s.capacity.as_ref()));

    let taints = node
        .spec
        .as_ref()
        .and_then(|s| s.taints.as_ref())
        .map(|taints| {
            taints
                .iter()
                .map(|t| Taint {
                    key: t.key.clone(),
                    value: t.value.clone(),
                    effect: t.effect.clone(),
                })
                .collect()
        })
        .unwrap_or_default();

    NodeInfo {
        name: node.metadata.name.clone().unwrap_or_default(),
        labels: node.metadata.labels.clone().unwrap_or_default(),
        taints,
        allocatable: resources(allocatable),
    }
}

pub(crate) fn map_pod(pod: &Pod) -> PodInfo {
    let spec = pod.spec.as_ref();

    PodInfo {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        node_name: spec.and_then(|s| s.node_name.clone()),
        requests: spec
            .map(|s| container_requests(&s.containers))
            .unwrap_or_default(),
    }
}

fn required_affinity(spec: &PodSpec) -> Vec<AffinityExpression> {
    spec.affinity
        .as_ref()
        .and_then(|a| a.node_affinity.as_ref())
        .and_then(|na| na.required_during_scheduling_ignored_during_execution.as_ref())
        .map(|selector| {
            selector
                .node_selector_terms
                .iter()
                .flat_map(|term| term.match_expressions.iter().flatten())
                .map(|expr| AffinityExpression {
                    key: expr.key.clone(),
                    operator: expr.operator.clone(),
                    values: expr.values.clone().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn tolerations(spec: &PodSpec) -> Vec<Toleration> {
    spec.tolerations
        .iter()
        .flatten()
        .map(|t| Toleration {
            key: t.key.clone(),
            operator: match t.operator.as_deref() {
                Some("Exists") => TolerationOperator::Exists,
                _ => TolerationOperator::Equal,
            },
            value: t.value.clone(),
        })
        .collect()
}

pub(crate) fn map_deployment(deployment: &Deployment) -> DeploymentInfo {
    let spec = deployment.spec.as_ref();
    let pod_spec = spec.and_then(|s| s.template.spec.as_ref());

    DeploymentInfo {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
        // the API server defaults replicas to 1
        replicas: spec.and_then(|s| s.replicas).unwrap_or(1) as i64,
        replica_requests: pod_spec
            .map(|s| container_requests(&s.containers))
            .unwrap_or_default(),
        affinity: pod_spec.map(required_affinity).unwrap_or_default(),
        tolerations: pod_spec.map(tolerations).unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsContainer {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

/// `metrics.k8s.io/v1beta1` PodMetrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub window: Option<String>,
    #[serde(default)]
    pub containers: Vec<PodMetricsContainer>,
}

impl k8s_openapi::Resource for PodMetrics {
    type Scope = k8s_openapi::NamespaceResourceScope;

    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const URL_PATH_SEGMENT: &'static str = "pods";
    const VERSION: &'static str = "v1beta1";
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

pub(crate) fn map_pod_metrics(metrics: &PodMetrics) -> PodUsage {
    PodUsage {
        name: metrics.metadata.name.clone().unwrap_or_default(),
        namespace: metrics.metadata.namespace.clone().unwrap_or_default(),
        containers: metrics
            .containers
            .iter()
            .map(|c| ContainerUsage {
                name: c.name.clone(),
                usage: resources(Some(&c.usage)),
            })
            .collect(),
    }
}
