//! Full-chain cost
//!
//! A service pays for its own footprint in full. Its dependencies' footprint
//! is charged in full too, unless the service is a frontend with an ingress
//! share, in which case it only pays that share.

use crate::models::ResourceQuantity;
use std::collections::BTreeMap;

pub fn full_chain(
    service: &str,
    dependencies: &[String],
    really_occupied: &BTreeMap<String, ResourceQuantity>,
    ingress_multipliers: &BTreeMap<String, f64>,
) -> ResourceQuantity {
    let own = really_occupied.get(service).copied().unwrap_or_default();

    let dependency_sum: ResourceQuantity = dependencies
        .iter()
        .filter_map(|name| really_occupied.get(name))
        .sum();

    let charged = match ingress_multipliers.get(service) {
        Some(multiplier) => dependency_sum.scale(*multiplier),
        None => dependency_sum,
    };

    own + charged
}
