//! Graph heuristics for concrete refactoring decisions
//!
//! - cyclic_dependency: which edge to break (the one whose target has the
//!   lowest fan-in)
//! - bottleneck: which callers could move behind a facade
//! - god_module: which neighbours to extract from or group

use crate::graph::self_map::SelfMap;
use crate::graph::{stem_index, ProjectGraph};
use crate::models::{normalize_path, path_stem};

const HINT_TOP_N: usize = 5;

/// The edge inside `cycle` whose removal disturbs the fewest dependents
pub fn suggest_cycle_break_edge(graph: &ProjectGraph, cycle: &[String]) -> Option<(String, String)> {
    let fan = graph.fan_in_out();
    let mut candidates: Vec<(usize, &str, &str)> = Vec::new();
    for src in cycle {
        for dst in graph.edges_from(src) {
            if cycle.contains(dst) {
                let fan_in = fan.get(dst).map(|(i, _)| *i).unwrap_or(0);
                candidates.push((fan_in, src.as_str(), dst.as_str()));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    candidates
        .first()
        .map(|(_, src, dst)| (src.to_string(), dst.to_string()))
}

/// Import name in `src`'s dependency list that points at `dst`
///
/// Falls back to `dst`'s stem, except for package `__init__` files.
pub fn resolve_module_for_edge(self_map: &SelfMap, src: &str, dst: &str) -> Option<String> {
    let paths: Vec<String> = self_map.modules.iter().map(|m| m.path.clone()).collect();
    let by_stem = stem_index(&paths);
    let dst_norm = normalize_path(dst);
    let resolved = self_map.imports_of(&normalize_path(src)).iter().find(|import| {
        let first = import.split('.').next().unwrap_or(import.as_str());
        by_stem
            .get(first)
            .is_some_and(|path| normalize_path(path) == dst_norm)
    });
    if let Some(import) = resolved {
        return Some(import.clone());
    }
    let stem = path_stem(&dst_norm);
    (!stem.is_empty() && stem != "__init__").then(|| stem.to_string())
}

/// Callers of `node`, busiest first
pub fn suggest_facade_candidates(graph: &ProjectGraph, node: &str, top_n: usize) -> Vec<String> {
    let fan = graph.fan_in_out();
    let mut callers: Vec<(usize, String)> = graph
        .callers_of(node)
        .into_iter()
        .map(|c| (fan.get(&c).map(|(i, _)| *i).unwrap_or(0), c))
        .collect();
    callers.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    callers.into_iter().take(top_n).map(|(_, c)| c).collect()
}

/// Neighbourhood of a module considered for splitting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitHint {
    pub imports_from: Vec<String>,
    pub imported_by: Vec<String>,
}

pub fn suggest_god_module_split_hint(graph: &ProjectGraph, node: &str, top_n: usize) -> SplitHint {
    SplitHint {
        imports_from: graph.edges_from(node).iter().take(top_n).cloned().collect(),
        imported_by: graph.callers_of(node).into_iter().take(top_n).collect(),
    }
}

fn first_three(items: &[String]) -> String {
    items.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
}

/// Graph-derived suggestions for one smell
pub fn graph_hints_for_smell(graph: &ProjectGraph, smell_type: &str, nodes: &[String]) -> Vec<String> {
    let mut hints = Vec::new();
    let Some(first) = nodes.first() else {
        return hints;
    };
    match smell_type {
        "cyclic_dependency" => {
            if let Some((src, dst)) = suggest_cycle_break_edge(graph, nodes) {
                hints.push(format!(
                    "Break cycle: consider removing or inverting import {} -> {}.",
                    src, dst
                ));
            }
        }
        "bottleneck" => {
            let callers = suggest_facade_candidates(graph, first, HINT_TOP_N);
            if !callers.is_empty() {
                let more = if callers.len() > 3 { "..." } else { "" };
                hints.push(format!(
                    "Introduce facade for callers: {}{}.",
                    first_three(&callers),
                    more
                ));
            }
        }
        "god_module" => {
            let info = suggest_god_module_split_hint(graph, first, HINT_TOP_N);
            if !info.imports_from.is_empty() {
                hints.push(format!(
                    "Extract from imports: {}.",
                    first_three(&info.imports_from)
                ));
            }
            if !info.imported_by.is_empty() {
                hints.push(format!(
                    "Consider grouping callers: {}.",
                    first_three(&info.imported_by)
                ));
            }
        }
        _ => {}
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::self_map::ModuleEntry;
    use std::collections::BTreeMap;

    fn cycle(nodes: &[&str]) -> Vec<String> {
        nodes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cycle_break_prefers_low_fan_in() {
        let graph = ProjectGraph::from_pairs(&[
            ("a.py", "b.py"),
            ("b.py", "a.py"),
            ("x.py", "b.py"),
            ("y.py", "b.py"),
        ]);
        let edge = suggest_cycle_break_edge(&graph, &cycle(&["a.py", "b.py"]));
        assert_eq!(edge, Some(("b.py".to_string(), "a.py".to_string())));
    }

    #[test]
    fn test_cycle_break_tie_by_source() {
        let graph = ProjectGraph::from_pairs(&[("c.py", "a.py"), ("a.py", "b.py"), ("b.py", "c.py")]);
        let edge = suggest_cycle_break_edge(&graph, &cycle(&["c.py", "a.py", "b.py"]));
        assert_eq!(edge, Some(("a.py".to_string(), "b.py".to_string())));
        assert_eq!(suggest_cycle_break_edge(&graph, &[]), None);
    }

    fn self_map(deps: &[(&str, &[&str])], paths: &[&str]) -> SelfMap {
        SelfMap {
            modules: paths
                .iter()
                .map(|p| ModuleEntry {
                    path: p.to_string(),
                    lines: 1,
                    functions: vec![],
                    classes: vec![],
                })
                .collect(),
            dependencies: deps
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_resolve_module_for_edge() {
        let sm = self_map(
            &[("a.py", &["os", "pkg.b.inner"])],
            &["a.py", "pkg/b.py"],
        );
        // first segment `pkg` is not a module stem, so the stem fallback applies
        assert_eq!(resolve_module_for_edge(&sm, "a.py", "pkg/b.py"), Some("b".into()));

        let sm = self_map(&[("a.py", &["b.helpers"])], &["a.py", "b.py"]);
        assert_eq!(
            resolve_module_for_edge(&sm, "a.py", "b.py"),
            Some("b.helpers".into())
        );
        assert_eq!(resolve_module_for_edge(&sm, "a.py", "pkg/__init__.py"), None);
    }

    #[test]
    fn test_facade_candidates_order() {
        let graph = ProjectGraph::from_pairs(&[
            ("a.py", "core.py"),
            ("b.py", "core.py"),
            ("z.py", "b.py"),
        ]);
        assert_eq!(
            suggest_facade_candidates(&graph, "core.py", 5),
            vec!["b.py", "a.py"]
        );
    }

    #[test]
    fn test_graph_hints() {
        let pairs: Vec<(String, String)> = (0..4)
            .map(|i| (format!("c{}.py", i), "core.py".to_string()))
            .collect();
        let refs: Vec<(&str, &str)> = pairs.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        let graph = ProjectGraph::from_pairs(&refs);
        let hints = graph_hints_for_smell(&graph, "bottleneck", &cycle(&["core.py"]));
        assert_eq!(
            hints,
            vec!["Introduce facade for callers: c0.py, c1.py, c2.py...."]
        );
        let hints = graph_hints_for_smell(&graph, "god_module", &cycle(&["core.py"]));
        assert_eq!(hints, vec!["Consider grouping callers: c0.py, c1.py, c2.py."]);
        assert!(graph_hints_for_smell(&graph, "hub", &cycle(&["core.py"])).is_empty());
    }
}
