//! Inter-metric dependency analysis
//!
//! A formula depends on another metric wherever a `metric` reference
//! appears in its tree. Batch runs order metrics so dependencies are
//! computed first; cyclic edges are broken with a warning and the
//! affected metrics still get an evaluation attempt.

use esg_model::FormulaConfig;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// All metric codes a formula references, direct children included at
/// any depth
pub fn extract_dependencies(config: &FormulaConfig) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    collect(config, &mut deps);
    deps
}

fn collect(config: &FormulaConfig, deps: &mut BTreeSet<String>) {
    match config {
        FormulaConfig::Metric { metric_code } => {
            deps.insert(metric_code.clone());
        },
        FormulaConfig::Ratio {
            numerator,
            denominator,
        }
        | FormulaConfig::Percentage {
            numerator,
            denominator,
        } => {
            collect(numerator, deps);
            collect(denominator, deps);
        },
        FormulaConfig::Difference { current, previous }
        | FormulaConfig::YoyRate { current, previous } => {
            collect(current, deps);
            collect(previous, deps);
        },
        FormulaConfig::WeightedAvg { components } => {
            for component in components {
                collect(&component.value, deps);
                collect(&component.weight, deps);
            }
        },
        FormulaConfig::Count { .. }
        | FormulaConfig::Sum { .. }
        | FormulaConfig::Avg { .. }
        | FormulaConfig::Custom { .. } => {},
    }
}

/// Dependencies-first ordering of a metric set
///
/// Edges pointing outside the map are ignored; those references are
/// resolved on demand during evaluation. A cyclic edge is dropped with
/// a warning, so every metric appears in the output exactly once.
pub fn topological_sort(graph: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut order = Vec::with_capacity(graph.len());
    let mut visiting = BTreeSet::new();
    let mut done = BTreeSet::new();

    for code in graph.keys() {
        visit(code, graph, &mut visiting, &mut done, &mut order);
    }

    order
}

fn visit(
    code: &str,
    graph: &BTreeMap<String, BTreeSet<String>>,
    visiting: &mut BTreeSet<String>,
    done: &mut BTreeSet<String>,
    order: &mut Vec<String>,
) {
    if done.contains(code) {
        return;
    }
    if visiting.contains(code) {
        warn!(metric_code = %code, "circular metric dependency, breaking edge");
        return;
    }

    visiting.insert(code.to_string());
    if let Some(deps) = graph.get(code) {
        for dep in deps {
            if graph.contains_key(dep) {
                visit(dep, graph, visiting, done, order);
            }
        }
    }
    visiting.remove(code);

    done.insert(code.to_string());
    order.push(code.to_string());
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        edges
            .iter()
            .map(|(code, deps)| {
                (
                    code.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    fn position(order: &[String], code: &str) -> usize {
        order.iter().position(|c| c == code).unwrap()
    }

    #[test]
    fn test_extract_nested_metric_refs() {
        let config: FormulaConfig = serde_json::from_value(serde_json::json!({
            "kind": "ratio",
            "numerator": {"kind": "metric", "metricCode": "E-001"},
            "denominator": {
                "kind": "difference",
                "current": {"kind": "metric", "metricCode": "S-002"},
                "previous": {"kind": "count", "dataSource": "employees"}
            }
        }))
        .unwrap();

        let deps = extract_dependencies(&config);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("E-001"));
        assert!(deps.contains("S-002"));
    }

    #[test]
    fn test_chain_ordering() {
        let order = topological_sort(&graph(&[
            ("C", &["B"]),
            ("B", &["A"]),
            ("A", &[]),
        ]));
        assert_eq!(order.len(), 3);
        assert!(position(&order, "A") < position(&order, "B"));
        assert!(position(&order, "B") < position(&order, "C"));
    }

    #[test]
    fn test_external_deps_ignored() {
        let order = topological_sort(&graph(&[("A", &["outside"])]));
        assert_eq!(order, vec!["A".to_string()]);
    }

    #[test]
    fn test_cycle_keeps_every_metric() {
        let order = topological_sort(&graph(&[
            ("A", &["B"]),
            ("B", &["A"]),
            ("C", &["A"]),
        ]));
        assert_eq!(order.len(), 3);
        assert!(position(&order, "A") < position(&order, "C"));
    }

    #[test]
    fn test_self_reference() {
        let order = topological_sort(&graph(&[("A", &["A"])]));
        assert_eq!(order, vec!["A".to_string()]);
    }
}
