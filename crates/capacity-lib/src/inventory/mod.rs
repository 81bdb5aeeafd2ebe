//! Collaborators that feed the engine
//!
//! The engine never talks to the network. Cluster inventory, live usage and
//! request rates are fetched here, behind traits, and frozen into a
//! [`ClusterSnapshot`](crate::models::ClusterSnapshot) before a cycle starts.

mod k8s;
mod promql;
mod quantity;
mod snapshot;

pub use k8s::KubeInventory;
pub use promql::PrometheusClient;
pub use quantity::{parse_cpu_millis, parse_memory_bytes};
pub use snapshot::{FetchFailure, SnapshotCollector, SnapshotOutcome};

use crate::models::{DeploymentInfo, NodeInfo, PodInfo, PodUsage};
use thiserror::Error;

pub use async_trait::async_trait;

/// A collaborator could not deliver its data for this cycle
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Source of cluster inventory and live usage
#[async_trait]
pub trait ClusterInventory: Send + Sync {
    /// All nodes in the cluster
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, FetchError>;

    /// All pods in every namespace
    async fn list_pods(&self) -> Result<Vec<PodInfo>, FetchError>;

    /// Deployments in one namespace
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, FetchError>;

    /// Live usage samples for pods in one namespace
    async fn list_pod_usage(&self, namespace: &str) -> Result<Vec<PodUsage>, FetchError>;
}

/// Source of request-rate signals
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Current value of an instant query; an empty result is 0
    async fn current_rate(&self, query: &str) -> Result<f64, FetchError>;
}
