//! Headroom and unit-cost projection

use crate::models::{ResourceQuantity, UnitCost};

/// How many more pods the eligible nodes could host at the current
/// full-chain footprint per pod. Negative values mean over-commitment.
///
/// A resource with a zero per-pod footprint does not constrain the result;
/// with no pods, or no constraining resource at all, the result is 0.
pub fn additional_pod_capacity(
    allocatable: ResourceQuantity,
    full_chain: ResourceQuantity,
    pods: i64,
) -> i64 {
    if pods <= 0 {
        return 0;
    }

    let per_pod_cpu = full_chain.cpu_millis / pods;
    let per_pod_mem = full_chain.memory_bytes / pods;

    let by_cpu = (per_pod_cpu > 0).then(|| allocatable.cpu_millis / per_pod_cpu);
    let by_mem = (per_pod_mem > 0).then(|| allocatable.memory_bytes / per_pod_mem);

    let total = match (by_cpu, by_mem) {
        (Some(cpu), Some(mem)) => cpu.min(mem),
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => return 0,
    };

    total - pods
}

/// Full-chain resources per unit of adjusted request rate
pub fn unit_cost(full_chain: ResourceQuantity, adjusted_rate: i64) -> UnitCost {
    if adjusted_rate == 0 {
        return UnitCost::default();
    }

    UnitCost {
        cpu_millis: full_chain.cpu_millis as f64 / adjusted_rate as f64,
        memory_bytes: full_chain.memory_bytes as f64 / adjusted_rate as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_additional_capacity_limited_by_scarcest_resource() {
        let result = additional_pod_capacity(
            ResourceQuantity::new(10_000, 10_000),
            ResourceQuantity::new(4000, 2000),
            2,
        );

        // per pod (2000, 1000): 5 by cpu, 10 by memory
        assert_eq!(result, 3);
    }

    #[test]
    fn test_over_commitment_is_negative() {
        let result = additional_pod_capacity(
            ResourceQuantity::new(1000, 1000),
            ResourceQuantity::new(4000, 4000),
            4,
        );

        assert_eq!(result, -3);
    }

    #[test]
    fn test_zero_pods_yields_zero() {
        assert_eq!(
            additional_pod_capacity(
                ResourceQuantity::new(10_000, 10_000),
                ResourceQuantity::new(4000, 2000),
                0
            ),
            0
        );
    }

    #[test]
    fn test_zero_footprint_resource_does_not_constrain() {
        let result = additional_pod_capacity(
            ResourceQuantity::new(10_000, 10_000),
            ResourceQuantity::new(0, 2000),
            2,
        );
        assert_eq!(result, 8);

        assert_eq!(
            additional_pod_capacity(ResourceQuantity::new(10, 10), ResourceQuantity::ZERO, 2),
            0
        );
    }

    #[test]
    fn test_unit_cost() {
        let cost = unit_cost(ResourceQuantity::new(4000, 2000), 800);

        assert_eq!(cost.cpu_millis, 5.0);
        assert_eq!(cost.memory_bytes, 2.5);
        assert_eq!(unit_cost(ResourceQuantity::new(4000, 2000), 0), UnitCost::default());
    }
}
