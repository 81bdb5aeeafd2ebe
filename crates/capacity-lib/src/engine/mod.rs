//! Capacity estimation engine
//!
//! Turns a frozen [`ClusterSnapshot`] into per-service headroom and
//! cost-per-request figures. The engine is pure: no I/O, no clocks, and the
//! same inputs always produce the same [`CycleReport`].
//!
//! A cycle runs in two phases. The first resolves the dependency graph and
//! aggregates every service independently. The second needs the complete
//! really-occupied table and the ingress shares, so it only starts once the
//! first phase has finished for all services.

mod aggregator;
mod chain;
mod eligibility;
mod projector;
mod resolver;
mod traffic;


pub use aggregator::{aggregate, WorkloadRef};
pub use chain::full_chain;
pub use eligibility::{
    eligible_nodes, is_eligible, matchers_from_affinity, taints_tolerated, LabelMatcher,
};
pub use projector::{additional_pod_capacity, unit_cost};
pub use resolver::resolve;
pub use traffic::{adjusted_rate, ingress_multipliers};

use crate::config::CapacityConfig;
use crate::models::{ClusterSnapshot, CycleReport, ServiceCapacity, TrafficState};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Dependency graph errors; either one aborts the whole cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("service '{service}' depends on undeclared service '{dependency}'")]
    UndeclaredDependency { service: String, dependency: String },
}

/// Run one full computation cycle
pub fn run_cycle(
    config: &CapacityConfig,
    snapshot: &ClusterSnapshot,
) -> Result<CycleReport, EngineError> {
    let chains = resolve(&config.dependency_graph())?;

    // Phase one: per-service topology, aggregation and traffic
    let mut partial = Vec::with_capacity(config.namespaces.len());

    for spec in &config.namespaces {
        let deployment = spec.deployment_name(&config.deployment);
        let workload = WorkloadRef {
            namespace: &spec.name,
            deployment: &deployment,
        };

        let deployment_info = aggregator::find_deployment(snapshot, workload);
        let (matchers, tolerations) = deployment_info
            .map(|d| (matchers_from_affinity(config, &d.affinity), d.tolerations.as_slice()))
            .unwrap_or_default();

        let eligible = eligible_nodes(&snapshot.nodes, &matchers, tolerations);
        let resources = aggregate(snapshot, &eligible, workload);

        let raw_rate = snapshot
            .request_rates
            .get(&spec.name)
            .copied()
            .unwrap_or(0.0);

        debug!(
            service = %spec.name,
            deployment = %deployment,
            eligible_nodes = eligible.len(),
            pods = resources.pods,
            "Aggregated service resources"
        );

        partial.push(ServiceCapacity {
            name: spec.name.clone(),
            deployment,
            eligible_nodes: eligible.iter().map(|n| n.name.clone()).collect(),
            full_chain_dependencies: chains.get(&spec.name).cloned().unwrap_or_default(),
            resources,
            traffic: TrafficState {
                raw_rate,
                adjusted_rate: adjusted_rate(spec, raw_rate),
                ingress_multiplier: None,
            },
            unit_cost: Default::default(),
            additional_pods: 0,
        });
    }

    // Phase two: needs every service's really-occupied value and all shares
    let really_occupied: BTreeMap<String, _> = partial
        .iter()
        .map(|s| (s.name.clone(), s.resources.really_occupied))
        .collect();

    let multipliers = ingress_multipliers(
        config
            .namespaces
            .iter()
            .zip(&partial)
            .filter(|(spec, _)| spec.frontend)
            .map(|(spec, service)| (spec.name.as_str(), service.traffic.adjusted_rate)),
    );

    let mut report = CycleReport::default();

    for mut service in partial {
        service.traffic.ingress_multiplier = multipliers.get(&service.name).copied();
        service.resources.full_chain = full_chain(
            &service.name,
            &service.full_chain_dependencies,
            &really_occupied,
            &multipliers,
        );
        service.additional_pods = additional_pod_capacity(
            service.resources.allocatable,
            service.resources.full_chain,
            service.resources.pods,
        );
        service.unit_cost = unit_cost(service.resources.full_chain, service.traffic.adjusted_rate);

        report.services.insert(service.name.clone(), service);
    }

    Ok(report)
}
