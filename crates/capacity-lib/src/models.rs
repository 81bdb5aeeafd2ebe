//! Core data models for the capacity engine
//!
//! Everything here is a plain value: snapshots are produced by the
//! collaborators in [`crate::inventory`] and consumed by [`crate::engine`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul};

/// CPU and memory amount
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceQuantity {
    pub cpu_millis: i64,
    pub memory_bytes: i64,
}

impl ResourceQuantity {
    pub const ZERO: ResourceQuantity = ResourceQuantity {
        cpu_millis: 0,
        memory_bytes: 0,
    };

    pub fn new(cpu_millis: i64, memory_bytes: i64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
        }
    }

    /// Elementwise maximum of two quantities
    pub fn componentwise_max(self, other: Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis.max(other.cpu_millis),
            memory_bytes: self.memory_bytes.max(other.memory_bytes),
        }
    }

    /// Scale both components by a factor, rounding to the nearest unit
    pub fn scale(self, factor: f64) -> Self {
        Self {
            cpu_millis: (self.cpu_millis as f64 * factor).round() as i64,
            memory_bytes: (self.memory_bytes as f64 * factor).round() as i64,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu_millis == 0 && self.memory_bytes == 0
    }
}

impl Add for ResourceQuantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            cpu_millis: self.cpu_millis + rhs.cpu_millis,
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
        }
    }
}

impl AddAssign for ResourceQuantity {
    fn add_assign(&mut self, rhs: Self) {
        self.cpu_millis += rhs.cpu_millis;
        self.memory_bytes += rhs.memory_bytes;
    }
}

impl Mul<i64> for ResourceQuantity {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self {
            cpu_millis: self.cpu_millis * rhs,
            memory_bytes: self.memory_bytes * rhs,
        }
    }
}

impl Sum for ResourceQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a ResourceQuantity> for ResourceQuantity {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Node taint as reported by the API server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    pub effect: String,
}

/// Toleration operator; Kubernetes treats a missing operator as `Equal`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TolerationOperator {
    Exists,
    #[default]
    Equal,
}

/// Deployment toleration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub operator: TolerationOperator,
    #[serde(default)]
    pub value: Option<String>,
}

/// One `matchExpressions` entry from a required node affinity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffinityExpression {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub taints: Vec<Taint>,
    pub allocatable: ResourceQuantity,
}

/// Scheduled pod with the sum of its containers' requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub node_name: Option<String>,
    pub requests: ResourceQuantity,
}

/// Deployment spec fields the engine cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: i64,
    /// Sum of container requests for a single replica
    pub replica_requests: ResourceQuantity,
    #[serde(default)]
    pub affinity: Vec<AffinityExpression>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

/// Live usage sample for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub usage: ResourceQuantity,
}

/// Live usage samples for one pod, from metrics.k8s.io
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodUsage {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub containers: Vec<ContainerUsage>,
}

impl PodUsage {
    pub fn total(&self) -> ResourceQuantity {
        self.containers.iter().map(|c| c.usage).sum()
    }
}

/// Frozen inputs for a single computation cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub pods: Vec<PodInfo>,
    #[serde(default)]
    pub deployments: Vec<DeploymentInfo>,
    #[serde(default)]
    pub usage: Vec<PodUsage>,
    /// Raw request rate per service; a missing entry means rate 0
    #[serde(default)]
    pub request_rates: BTreeMap<String, f64>,
}

/// Per-service resource figures for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResourceState {
    pub allocatable: ResourceQuantity,
    pub total_requested: ResourceQuantity,
    pub deployment_requested: ResourceQuantity,
    pub used: ResourceQuantity,
    pub really_occupied: ResourceQuantity,
    pub full_chain: ResourceQuantity,
    pub pods: i64,
}

/// Per-service traffic figures for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficState {
    pub raw_rate: f64,
    pub adjusted_rate: i64,
    /// Only set for frontends when the total frontend rate is non-zero
    pub ingress_multiplier: Option<f64>,
}

/// Resources consumed per unit of adjusted request rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitCost {
    pub cpu_millis: f64,
    pub memory_bytes: f64,
}

/// Result of one cycle for one service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceCapacity {
    pub name: String,
    pub deployment: String,
    pub eligible_nodes: Vec<String>,
    pub full_chain_dependencies: Vec<String>,
    pub resources: ServiceResourceState,
    pub traffic: TrafficState,
    pub unit_cost: UnitCost,
    pub additional_pods: i64,
}

/// Result of one full computation cycle, keyed by service name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub services: BTreeMap<String, ServiceCapacity>,
}
