//! Traffic adjustment and ingress shares

use crate::config::ServiceSpec;
use std::collections::BTreeMap;

/// Scale a raw request rate down to the part that drives full-chain cost.
///
/// Frontends keep only their successful share, and shared frontends only the
/// share forwarded to shared dependencies. Zero percentages are "unset".
pub fn adjusted_rate(spec: &ServiceSpec, raw_rate: f64) -> i64 {
    let mut multiplier = 1.0;

    if spec.frontend && spec.frontend_successful_percentage != 0.0 {
        multiplier *= spec.frontend_successful_percentage / 100.0;
    }

    if spec.frontend && spec.shared && spec.frontend_to_shared_percentage != 0.0 {
        multiplier *= spec.frontend_to_shared_percentage / 100.0;
    }

    // f64::round rounds half away from zero
    (raw_rate * multiplier).round() as i64
}

/// Each frontend's share of the total adjusted frontend traffic.
///
/// Returns an empty map when the frontends carry no traffic at all.
pub fn ingress_multipliers<'a, I>(frontend_rates: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let rates: Vec<(&str, i64)> = frontend_rates.into_iter().collect();
    let total: i64 = rates.iter().map(|(_, rate)| rate).sum();

    if total == 0 {
        return BTreeMap::new();
    }

    rates
        .into_iter()
        .map(|(name, rate)| (name.to_string(), rate as f64 / total as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontend(success: f64) -> ServiceSpec {
        ServiceSpec {
            frontend: true,
            frontend_successful_percentage: success,
            ..ServiceSpec::new("web")
        }
    }

    #[test]
    fn test_success_percentage_applies_to_frontends() {
        assert_eq!(adjusted_rate(&frontend(90.0), 1000.0), 900);
    }

    #[test]
    fn test_shared_percentage_stacks() {
        let spec = ServiceSpec {
            shared: true,
            frontend_to_shared_percentage: 50.0,
            ..frontend(90.0)
        };

        assert_eq!(adjusted_rate(&spec, 1000.0), 450);
    }

    #[test]
    fn test_shared_percentage_ignored_when_not_shared() {
        let spec = ServiceSpec {
            frontend_to_shared_percentage: 50.0,
            ..frontend(90.0)
        };

        assert_eq!(adjusted_rate(&spec, 1000.0), 900);
    }

    #[test]
    fn test_backends_and_unset_percentages_are_not_scaled() {
        let backend = ServiceSpec {
            frontend_successful_percentage: 50.0,
            ..ServiceSpec::new("db")
        };

        assert_eq!(adjusted_rate(&backend, 1234.4), 1234);
        assert_eq!(adjusted_rate(&frontend(0.0), 1234.5), 1235);
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(adjusted_rate(&frontend(50.0), 5.0), 3);
        assert_eq!(adjusted_rate(&frontend(50.0), 3.0), 2);
    }

    #[test]
    fn test_ingress_multipliers_are_shares() {
        let multipliers = ingress_multipliers([("a", 300), ("b", 700)]);

        assert!((multipliers["a"] - 0.3).abs() < 1e-9);
        assert!((multipliers["b"] - 0.7).abs() < 1e-9);
        assert!((multipliers.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ingress_multipliers_zero_total() {
        assert!(ingress_multipliers([("a", 0), ("b", 0)]).is_empty());
        assert!(ingress_multipliers(std::iter::empty::<(&str, i64)>()).is_empty());
    }
}
