//! Node eligibility
//!
//! Decides which nodes may host a service's pods, from the deployment's
//! recognized node-affinity rules and the node taints it tolerates.

use crate::config::CapacityConfig;
use crate::models::{AffinityExpression, NodeInfo, Taint, Toleration, TolerationOperator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label rule derived from a node-affinity expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LabelMatcher {
    /// Node must carry one of these values (`In`)
    Allowed { key: String, values: Vec<String> },
    /// Node must not carry any of these values (`NotIn`)
    Forbidden { key: String, values: Vec<String> },
}

impl LabelMatcher {
    fn key_values(&self) -> (&str, &[String]) {
        match self {
            LabelMatcher::Allowed { key, values } | LabelMatcher::Forbidden { key, values } => {
                (key, values)
            }
        }
    }

    /// Whether any node label has this matcher's key and one of its values
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let (key, values) = self.key_values();
        labels
            .get(key)
            .is_some_and(|value| values.iter().any(|v| v == value))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, LabelMatcher::Forbidden { .. })
    }
}

/// Turn a deployment's affinity expressions into matchers, keeping only the
/// key/operator pairs on the configured allow-list.
pub fn matchers_from_affinity(
    config: &CapacityConfig,
    expressions: &[AffinityExpression],
) -> Vec<LabelMatcher> {
    expressions
        .iter()
        .filter(|expr| config.recognizes_affinity(&expr.key, &expr.operator))
        .filter_map(|expr| match expr.operator.as_str() {
            "In" => Some(LabelMatcher::Allowed {
                key: expr.key.clone(),
                values: expr.values.clone(),
            }),
            "NotIn" => Some(LabelMatcher::Forbidden {
                key: expr.key.clone(),
                values: expr.values.clone(),
            }),
            _ => None,
        })
        .collect()
}

/// Label policy: forbidden matches exclude, and when allowed matchers exist
/// one of them has to match.
fn labels_permit(labels: &BTreeMap<String, String>, matchers: &[LabelMatcher]) -> bool {
    let mut has_allowed = false;
    let mut allowed_match = false;

    for matcher in matchers {
        let hit = matcher.matches(labels);
        if matcher.is_forbidden() {
            if hit {
                return false;
            }
        } else {
            has_allowed = true;
            allowed_match |= hit;
        }
    }

    !has_allowed || allowed_match
}

fn tolerates(taint: &Taint, tolerations: &[Toleration]) -> bool {
    tolerations.iter().any(|toleration| {
        if toleration.key.as_deref() != Some(taint.key.as_str()) {
            return false;
        }
        match toleration.operator {
            TolerationOperator::Exists => true,
            TolerationOperator::Equal => toleration.value == taint.value,
        }
    })
}

/// Every taint on the node must be tolerated
pub fn taints_tolerated(taints: &[Taint], tolerations: &[Toleration]) -> bool {
    taints.iter().all(|taint| tolerates(taint, tolerations))
}

/// Whether a node may host the service
pub fn is_eligible(node: &NodeInfo, matchers: &[LabelMatcher], tolerations: &[Toleration]) -> bool {
    labels_permit(&node.labels, matchers) && taints_tolerated(&node.taints, tolerations)
}

/// Nodes that may host the service
pub fn eligible_nodes<'a>(
    nodes: &'a [NodeInfo],
    matchers: &[LabelMatcher],
    tolerations: &[Toleration],
) -> Vec<&'a NodeInfo> {
    nodes
        .iter()
        .filter(|node| is_eligible(node, matchers, tolerations))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceQuantity;

    fn node(labels: &[(&str, &str)], taints: Vec<Taint>) -> NodeInfo {
        NodeInfo {
            name: "node".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            taints,
            allocatable: ResourceQuantity::new(1000, 1000),
        }
    }

    fn allowed(key: &str, values: &[&str]) -> LabelMatcher {
        LabelMatcher::Allowed {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn forbidden(key: &str, values: &[&str]) -> LabelMatcher {
        LabelMatcher::Forbidden {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn gpu_taint() -> Taint {
        Taint {
            key: "gpu".to_string(),
            value: Some("true".to_string()),
            effect: "NoSchedule".to_string(),
        }
    }

    #[test]
    fn test_unlabeled_node_without_rules_is_eligible() {
        assert!(is_eligible(&node(&[], vec![]), &[], &[]));
    }

    #[test]
    fn test_forbidden_only() {
        let rules = [forbidden("zone", &["a"])];

        assert!(!is_eligible(&node(&[("zone", "a")], vec![]), &rules, &[]));
        assert!(is_eligible(&node(&[("zone", "b")], vec![]), &rules, &[]));
        assert!(is_eligible(&node(&[], vec![]), &rules, &[]));
    }

    #[test]
    fn test_allowed_only() {
        let rules = [allowed("hw", &["fast", "medium"])];

        assert!(is_eligible(&node(&[("hw", "fast")], vec![]), &rules, &[]));
        assert!(!is_eligible(&node(&[("hw", "slow")], vec![]), &rules, &[]));
        assert!(!is_eligible(&node(&[], vec![]), &rules, &[]));
    }

    #[test]
    fn test_forbidden_takes_precedence_over_allowed() {
        let rules = [allowed("hw", &["fast"]), forbidden("zone", &["a"])];

        assert!(!is_eligible(
            &node(&[("hw", "fast"), ("zone", "a")], vec![]),
            &rules,
            &[]
        ));
        assert!(is_eligible(
            &node(&[("hw", "fast"), ("zone", "b")], vec![]),
            &rules,
            &[]
        ));
        assert!(!is_eligible(&node(&[("zone", "b")], vec![]), &rules, &[]));
    }

    #[test]
    fn test_exists_toleration_covers_taint() {
        let tolerations = [Toleration {
            key: Some("gpu".to_string()),
            operator: TolerationOperator::Exists,
            value: None,
        }];

        assert!(is_eligible(&node(&[], vec![gpu_taint()]), &[], &tolerations));
    }

    #[test]
    fn test_equal_toleration_requires_same_value() {
        let matching = [Toleration {
            key: Some("gpu".to_string()),
            operator: TolerationOperator::Equal,
            value: Some("true".to_string()),
        }];
        let other_value = [Toleration {
            key: Some("gpu".to_string()),
            operator: TolerationOperator::Equal,
            value: Some("false".to_string()),
        }];

        assert!(is_eligible(&node(&[], vec![gpu_taint()]), &[], &matching));
        assert!(!is_eligible(&node(&[], vec![gpu_taint()]), &[], &other_value));
    }

    #[test]
    fn test_single_untolerated_taint_disqualifies() {
        let spot = Taint {
            key: "spot".to_string(),
            value: None,
            effect: "NoExecute".to_string(),
        };
        let tolerations = [Toleration {
            key: Some("gpu".to_string()),
            operator: TolerationOperator::Exists,
            value: None,
        }];

        assert!(!is_eligible(
            &node(&[], vec![gpu_taint(), spot]),
            &[],
            &tolerations
        ));
        assert!(!is_eligible(&node(&[], vec![gpu_taint()]), &[], &[]));
    }

    #[test]
    fn test_matchers_follow_allow_list() {
        let config = CapacityConfig::from_yaml(
            "affinity:\n  - key: hw\n    operator: NotIn\n  - key: zone\n    operator: In\n",
        )
        .unwrap();
        let expressions = vec![
            AffinityExpression {
                key: "hw".to_string(),
                operator: "NotIn".to_string(),
                values: vec!["old".to_string()],
            },
            AffinityExpression {
                key: "zone".to_string(),
                operator: "In".to_string(),
                values: vec!["a".to_string()],
            },
            AffinityExpression {
                key: "hw".to_string(),
                operator: "In".to_string(),
                values: vec!["new".to_string()],
            },
        ];

        let matchers = matchers_from_affinity(&config, &expressions);

        assert_eq!(matchers, vec![forbidden("hw", &["old"]), allowed("zone", &["a"])]);
    }
}
