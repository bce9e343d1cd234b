//! Static registry checks run before evaluation.
//!
//! Problems found here reject individual items as configuration errors;
//! the rest of the registry still runs.

use crate::metric::MetricRegistry;
use crate::source::SourceRegistry;
use cube_core::types::CubeError;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// An item rejected by static analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryIssue {
    /// Index of the item in the registry's `items`
    pub index: usize,
    /// Item id
    pub id: String,
    /// Why the item was rejected
    pub error: CubeError,
}

fn duplicate_issues<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<RegistryIssue> {
    let mut seen = BTreeSet::new();
    ids.enumerate()
        .filter(|(_, id)| !seen.insert(*id))
        .map(|(index, id)| RegistryIssue {
            index,
            id: id.to_string(),
            error: CubeError::configuration(id, "duplicate id"),
        })
        .collect()
}

/// Check a source registry.
///
/// Rejects repeated ids (every occurrence after the first) and multipliers
/// that read the source itself or a source that is processed later.
pub fn analyze_source_registry(registry: &SourceRegistry) -> Vec<RegistryIssue> {
    let mut issues = duplicate_issues(registry.items.iter().map(|item| item.id.as_str()));

    let position: HashMap<&str, usize> = registry
        .ordered_indices()
        .into_iter()
        .enumerate()
        .map(|(pos, index)| (registry.items[index].id.as_str(), pos))
        .collect();

    for (index, item) in registry.items.iter().enumerate() {
        if issues.iter().any(|issue| issue.index == index) {
            continue;
        }
        let own = position.get(item.id.as_str()).copied().unwrap_or(usize::MAX);
        let offending = item.multipliers.iter().find_map(|m| {
            if m.id == item.id {
                Some(format!("multiplier '{}' reads the source itself", m.id))
            } else {
                match position.get(m.id.as_str()) {
                    Some(&pos) if pos > own => {
                        Some(format!("multiplier '{}' reads a source processed later", m.id))
                    }
                    _ => None,
                }
            }
        });
        if let Some(message) = offending {
            issues.push(RegistryIssue {
                index,
                id: item.id.clone(),
                error: CubeError::configuration(&item.id, message),
            });
        }
    }

    issues.sort_by_key(|issue| issue.index);
    issues
}

/// Check a metric registry.
///
/// Rejects repeated ids and every metric that lies on a metric-to-metric
/// dependency cycle. Dependencies come from `metric` dependencies and from
/// operations whose id names a metric. Metrics that merely depend on a
/// cyclic metric are left to fail their dependency resolution at run time.
pub fn analyze_metric_registry(registry: &MetricRegistry) -> Vec<RegistryIssue> {
    let mut issues = duplicate_issues(registry.items.iter().map(|item| item.id.as_str()));

    let index_of: BTreeMap<&str, usize> = registry
        .items
        .iter()
        .enumerate()
        .rev()
        .map(|(index, item)| (item.id.as_str(), index))
        .collect();

    // Edges point from a metric to the metrics it reads.
    let edges: BTreeMap<&str, Vec<&str>> = index_of
        .iter()
        .map(|(&id, &index)| {
            let targets: Vec<&str> = registry.items[index]
                .metric_dependencies()
                .into_iter()
                .filter(|target| index_of.contains_key(target))
                .collect();
            (id, targets)
        })
        .collect();

    for id in cyclic_nodes(&edges) {
        let index = index_of[id];
        let cycle = find_cycle(&edges, id).unwrap_or_else(|| vec![id.to_string()]);
        issues.push(RegistryIssue {
            index,
            id: id.to_string(),
            error: CubeError::CyclicDependency { cycle },
        });
    }

    issues.sort_by_key(|issue| issue.index);
    issues
}

/// Nodes left over after Kahn's algorithm that can reach themselves.
fn cyclic_nodes<'a>(edges: &BTreeMap<&'a str, Vec<&'a str>>) -> Vec<&'a str> {
    // Peel nodes without outgoing edges to unresolved nodes.
    let mut out_degree: BTreeMap<&str, usize> =
        edges.iter().map(|(&id, targets)| (id, targets.len())).collect();
    let mut readers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (&id, targets) in edges {
        for &target in targets {
            readers.entry(target).or_default().push(id);
        }
    }

    let mut queue: VecDeque<&str> = out_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    while let Some(current) = queue.pop_front() {
        for &reader in readers.get(current).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = out_degree.get_mut(reader) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(reader);
                }
            }
        }
    }

    out_degree
        .into_iter()
        .filter(|&(id, degree)| degree > 0 && find_cycle(edges, id).is_some())
        .map(|(id, _)| id)
        .collect()
}

/// Path `start -> ... -> start`, if one exists.
fn find_cycle(edges: &BTreeMap<&str, Vec<&str>>, start: &str) -> Option<Vec<String>> {
    let mut visited = BTreeSet::new();
    let mut path = vec![start];
    if walk(edges, start, start, &mut visited, &mut path) {
        Some(path.into_iter().map(str::to_string).collect())
    } else {
        None
    }
}

fn walk<'a>(
    edges: &BTreeMap<&'a str, Vec<&'a str>>,
    start: &str,
    current: &'a str,
    visited: &mut BTreeSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    for &next in edges.get(current).map(Vec::as_slice).unwrap_or_default() {
        if next == start {
            path.push(next);
            return true;
        }
        if visited.insert(next) {
            path.push(next);
            if walk(edges, start, next, visited, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Dependency, MetricItem, MetricOperation};
    use crate::source::{Multiplier, MultiplierOperation, SourceItem, SourceOutput};

    fn indirect(id: &str, priority: i32, reads: &str) -> SourceItem {
        SourceItem::indirect(id, priority, &["x"])
            .with_multiplier(Multiplier::new(reads, MultiplierOperation::Multiply, 0))
    }

    #[test]
    fn test_source_duplicates_and_forward_reads() {
        let registry = SourceRegistry::new()
            .with_item(SourceItem::direct("a", 1, &["x"]))
            .with_item(SourceItem::direct("a", 2, &["y"]))
            .with_item(indirect("early", 1, "late"))
            .with_item(indirect("late", 2, "a"))
            .with_item(indirect("selfish", 3, "selfish"))
            .with_item(SourceItem::virtual_source("v", 0, |_, _| Ok(SourceOutput::Series(vec![]))));

        let issues = analyze_source_registry(&registry);
        let ids: Vec<&str> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "early", "selfish"]);
        assert_eq!(issues[0].index, 1);
        assert!(issues.iter().all(|i| i.error.is_configuration()));
    }

    #[test]
    fn test_reference_multiplier_not_flagged() {
        let registry = SourceRegistry::new().with_item(indirect("opex", 1, "opexEscalation"));
        assert!(analyze_source_registry(&registry).is_empty());
    }

    #[test]
    fn test_metric_cycle_detected() {
        let registry = MetricRegistry::new()
            .with_item(MetricItem::direct("base", 0))
            .with_item(MetricItem::indirect("x", 1).with_dependency(Dependency::metric("y")))
            .with_item(MetricItem::indirect("y", 2).with_dependency(Dependency::metric("x")))
            .with_item(MetricItem::indirect("downstream", 3).with_dependency(Dependency::metric("x")))
            .with_item(MetricItem::indirect("ok", 4).with_dependency(Dependency::metric("base")));

        let issues = analyze_metric_registry(&registry);
        let ids: Vec<&str> = issues.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(
            issues[0].error,
            CubeError::CyclicDependency {
                cycle: vec!["x".into(), "y".into(), "x".into()]
            }
        );
    }

    #[test]
    fn test_self_operation_cycle() {
        let registry = MetricRegistry::new().with_item(
            MetricItem::direct("loop", 0)
                .with_operation(MetricOperation::new("loop", |base, _, target, _, _| base + target)),
        );
        let issues = analyze_metric_registry(&registry);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].error.to_string().contains("loop -> loop"));
    }
}
