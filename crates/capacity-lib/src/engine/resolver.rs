//! Dependency resolution
//!
//! Expands each service's direct dependencies into its full transitive
//! chain with a depth-first walk that carries the ancestor path. Each
//! dependency is expanded at most once per root, so shared dependencies
//! cost nothing extra.

use super::EngineError;
use std::collections::{BTreeMap, HashSet};

/// Resolve every service's transitive dependencies.
///
/// The list for a service holds each dependency once, in first-discovery
/// order, even when it is reachable through several paths.
pub fn resolve(
    graph: &BTreeMap<String, Vec<String>>,
) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
    let mut resolved = BTreeMap::new();

    for name in graph.keys() {
        let mut walk = Walk {
            graph,
            ancestors: vec![name.clone()],
            seen: HashSet::new(),
            chain: Vec::new(),
        };
        walk.visit(name)?;
        resolved.insert(name.clone(), walk.chain);
    }

    Ok(resolved)
}

/// State of one root's traversal
struct Walk<'a> {
    graph: &'a BTreeMap<String, Vec<String>>,
    ancestors: Vec<String>,
    /// Dependencies already expanded from this root
    seen: HashSet<&'a str>,
    chain: Vec<String>,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, name: &str) -> Result<(), EngineError> {
        let graph = self.graph;
        let direct = graph.get(name).map(Vec::as_slice).unwrap_or_default();

        for dependency in direct {
            if !graph.contains_key(dependency) {
                return Err(EngineError::UndeclaredDependency {
                    service: name.to_string(),
                    dependency: dependency.clone(),
                });
            }

            // checked before `seen` so a back edge is never mistaken for a repeat
            if self.ancestors.iter().any(|a| a == dependency) {
                let mut cycle = self.ancestors.clone();
                cycle.push(dependency.clone());
                return Err(EngineError::CyclicDependency { chain: cycle });
            }

            if !self.seen.insert(dependency.as_str()) {
                continue;
            }

            self.chain.push(dependency.clone());
            self.ancestors.push(dependency.clone());
            self.visit(dependency)?;
            self.ancestors.pop();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(name, deps)| {
                (
                    name.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_resolves_transitive_chain_in_traversal_order() {
        let g = graph(&[
            ("web", &["api", "cache"]),
            ("api", &["db"]),
            ("cache", &[]),
            ("db", &[]),
        ]);

        let resolved = resolve(&g).unwrap();

        assert_eq!(resolved["web"], vec!["api", "db", "cache"]);
        assert_eq!(resolved["api"], vec!["db"]);
        assert!(resolved["db"].is_empty());
    }

    #[test]
    fn test_every_resolved_name_is_declared() {
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]);

        let resolved = resolve(&g).unwrap();

        for chain in resolved.values() {
            assert!(chain.iter().all(|name| g.contains_key(name)));
        }
    }

    #[test]
    fn test_diamond_lists_shared_dependency_once() {
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &[]),
        ]);

        let resolved = resolve(&g).unwrap();

        assert_eq!(resolved["a"], vec!["b", "d", "c"]);
    }

    #[test]
    fn test_layered_diamonds_resolve_linearly() {
        // every service in a layer depends on both services of the next
        const LAYERS: usize = 40;
        let name = |layer: usize, slot: usize| format!("l{layer}s{slot}");

        let g: BTreeMap<String, Vec<String>> = (0..LAYERS)
            .flat_map(|layer| {
                (0..2).map(move |slot| {
                    let deps = if layer + 1 < LAYERS {
                        vec![name(layer + 1, 0), name(layer + 1, 1)]
                    } else {
                        Vec::new()
                    };
                    (name(layer, slot), deps)
                })
            })
            .collect();

        let resolved = resolve(&g).unwrap();

        assert_eq!(resolved["l0s0"].len(), 2 * (LAYERS - 1));
        assert_eq!(resolved["l0s0"][..3], ["l1s0", "l2s0", "l3s0"]);
        let total: usize = resolved.values().map(Vec::len).sum();
        assert_eq!(total, (0..LAYERS).map(|layer| 2 * 2 * (LAYERS - 1 - layer)).sum::<usize>());
    }

    #[test]
    fn test_cycle_behind_shared_dependency_is_rejected() {
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["d"]),
            ("c", &["d"]),
            ("d", &["c"]),
        ]);

        assert!(matches!(
            resolve(&g),
            Err(EngineError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);

        let err = resolve(&g).unwrap_err();

        match err {
            EngineError::CyclicDependency { chain } => {
                assert_eq!(chain.first(), chain.last());
                assert_eq!(chain.len(), 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let g = graph(&[("a", &["a"])]);

        assert!(matches!(
            resolve(&g),
            Err(EngineError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_undeclared_dependency_is_rejected() {
        let g = graph(&[("a", &["ghost"])]);

        match resolve(&g).unwrap_err() {
            EngineError::UndeclaredDependency {
                service,
                dependency,
            } => {
                assert_eq!(service, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
