//! File-level import graph
//!
//! Nodes are project files (normalized POSIX paths), edges are imports that
//! resolve to other project files. External and stdlib imports never appear.
//!
//! Layering is a heuristic based on dependency depth from leaves. It is fine
//! for relative comparisons, not as ground truth about architectural roles.

pub mod scanner;
pub mod self_map;

pub use self_map::{ModuleEntry, SelfMap};
pub use scanner::{python_files, scan_project};

use crate::models::{normalize_path, path_stem};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Per-node structural metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub fan_in: usize,
    pub fan_out: usize,
    pub layer: usize,
}

/// Whole-graph counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub cycles: usize,
    pub max_degree: usize,
    pub scc_count: usize,
}

/// Dependency graph over project files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGraph {
    nodes: BTreeSet<String>,
    edges: BTreeMap<String, Vec<String>>,
}

impl ProjectGraph {
    /// Build a graph; edge endpoints missing from `nodes` are registered
    pub fn new<N, E, S, D>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator<Item = S>,
        E: IntoIterator<Item = (S, D)>,
        D: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut graph = Self::default();
        for node in nodes {
            graph.add_node(node.as_ref());
        }
        for (src, dsts) in edges {
            let src = graph.add_node(src.as_ref());
            for dst in dsts {
                let dst = graph.add_node(dst.as_ref());
                graph.edges.entry(src.clone()).or_default().push(dst);
            }
        }
        graph
    }

    /// Convenience constructor from `(src, dst)` pairs
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
        for &(src, dst) in pairs {
            match grouped.iter_mut().find(|(s, _)| *s == src) {
                Some((_, dsts)) => dsts.push(dst),
                None => grouped.push((src, vec![dst])),
            }
        }
        Self::new(Vec::<&str>::new(), grouped)
    }

    fn add_node(&mut self, raw: &str) -> String {
        let node = normalize_path(raw);
        if self.nodes.insert(node.clone()) {
            self.edges.entry(node.clone()).or_default();
        }
        node
    }

    /// Resolve each module's dotted imports against project file stems
    ///
    /// Resolution uses the first dotted segment. When two files share a
    /// stem the last one listed wins. Unresolved imports are dropped.
    pub fn from_self_map(self_map: &SelfMap) -> Self {
        let files: Vec<String> = self_map
            .modules
            .iter()
            .map(|m| normalize_path(&m.path))
            .collect();
        let stems = stem_index(&files);

        let mut edges: Vec<(String, Vec<String>)> = Vec::new();
        let mut dropped = 0usize;
        for (src, imports) in &self_map.dependencies {
            let mut dsts = Vec::new();
            for import in imports {
                let first = import.split('.').next().unwrap_or(import);
                match stems.get(first) {
                    Some(dst) => dsts.push(dst.clone()),
                    None => dropped += 1,
                }
            }
            if !dsts.is_empty() {
                edges.push((normalize_path(src), dsts));
            }
        }
        debug!(
            "Built graph from self-map: {} files, {} unresolved imports dropped",
            files.len(),
            dropped
        );
        Self::new(files, edges)
    }

    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Ordered out-edges of `node`
    pub fn edges_from(&self, node: &str) -> &[String] {
        self.edges.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    /// All edges as `(src, dst)` pairs in source order
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges
            .iter()
            .flat_map(|(src, dsts)| dsts.iter().map(move |d| (src.as_str(), d.as_str())))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Nodes with an edge into `node`, in sorted source order
    pub fn callers_of(&self, node: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(_, dsts)| dsts.iter().any(|d| d == node))
            .map(|(src, _)| src.clone())
            .collect()
    }

    /// node -> (fan_in, fan_out)
    pub fn fan_in_out(&self) -> BTreeMap<String, (usize, usize)> {
        let mut fan: BTreeMap<String, (usize, usize)> =
            self.nodes.iter().map(|n| (n.clone(), (0, 0))).collect();
        for (src, dsts) in &self.edges {
            if let Some(entry) = fan.get_mut(src) {
                entry.1 = dsts.len();
            }
            for dst in dsts {
                if let Some(entry) = fan.get_mut(dst) {
                    entry.0 += 1;
                }
            }
        }
        fan
    }

    /// Elementary cycles found by depth-first search over sorted nodes
    ///
    /// A cycle is the DFS stack suffix starting at the node a back edge
    /// points to. Exact duplicates are suppressed; rotations of the same
    /// cycle may still appear.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for start in &self.nodes {
            if visited.contains(start.as_str()) {
                continue;
            }
            // (node, index of the next out-edge to follow)
            let mut frames: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            let mut path: Vec<&str> = vec![start.as_str()];
            visited.insert(start.as_str());
            on_stack.insert(start.as_str());

            while let Some(frame) = frames.last_mut() {
                let (node, next) = *frame;
                let succs = self.edges_from(node);
                if next >= succs.len() {
                    frames.pop();
                    path.pop();
                    on_stack.remove(node);
                    continue;
                }
                frame.1 += 1;
                let succ = succs[next].as_str();
                if !visited.contains(succ) {
                    visited.insert(succ);
                    on_stack.insert(succ);
                    frames.push((succ, 0));
                    path.push(succ);
                } else if on_stack.contains(succ) {
                    if let Some(idx) = path.iter().position(|n| *n == succ) {
                        let cycle: Vec<String> = path[idx..].iter().map(|s| s.to_string()).collect();
                        if !cycles.contains(&cycle) {
                            cycles.push(cycle);
                        }
                    }
                }
            }
        }
        cycles
    }

    /// Dependency depth from leaves; nodes stuck in cycles get the max layer
    pub fn layers(&self) -> BTreeMap<String, usize> {
        let mut layer: HashMap<&str, usize> = HashMap::new();
        for _ in 0..self.nodes.len() * 2 {
            let mut changed = false;
            for node in &self.nodes {
                let succs = self.edges_from(node);
                if succs.is_empty() {
                    if !layer.contains_key(node.as_str()) {
                        layer.insert(node.as_str(), 0);
                        changed = true;
                    }
                    continue;
                }
                let resolved: Option<Vec<usize>> =
                    succs.iter().map(|s| layer.get(s.as_str()).copied()).collect();
                if let Some(levels) = resolved {
                    let new_layer = 1 + levels.into_iter().max().unwrap_or(0);
                    if layer.get(node.as_str()) != Some(&new_layer) {
                        layer.insert(node.as_str(), new_layer);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        let fallback = layer.values().copied().max().unwrap_or(0);
        self.nodes
            .iter()
            .map(|n| (n.clone(), layer.get(n.as_str()).copied().unwrap_or(fallback)))
            .collect()
    }

    pub fn metrics(&self) -> BTreeMap<String, NodeMetrics> {
        let fan = self.fan_in_out();
        let layers = self.layers();
        fan.into_iter()
            .map(|(node, (fan_in, fan_out))| {
                let layer = layers.get(&node).copied().unwrap_or(0);
                (
                    node,
                    NodeMetrics {
                        fan_in,
                        fan_out,
                        layer,
                    },
                )
            })
            .collect()
    }

    /// Export to petgraph for algorithms that need it
    pub fn to_digraph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for node in &self.nodes {
            index.insert(node.clone(), graph.add_node(node.clone()));
        }
        for (src, dst) in self.edges() {
            if let (Some(&a), Some(&b)) = (index.get(src), index.get(dst)) {
                graph.add_edge(a, b, ());
            }
        }
        (graph, index)
    }

    /// Strongly connected components with more than one member
    pub fn strongly_connected(&self) -> Vec<Vec<String>> {
        let (graph, _) = self.to_digraph();
        let mut sccs: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<String> = scc.iter().map(|i| graph[*i].clone()).collect();
                members.sort();
                members
            })
            .collect();
        sccs.sort();
        sccs
    }

    pub fn summary(&self) -> GraphSummary {
        let max_degree = self
            .fan_in_out()
            .values()
            .map(|(i, o)| i + o)
            .max()
            .unwrap_or(0);
        GraphSummary {
            nodes: self.nodes.len(),
            edges: self.edge_count(),
            cycles: self.find_cycles().len(),
            max_degree,
            scc_count: self.strongly_connected().len(),
        }
    }
}

/// Stem -> path map; later entries override earlier ones
pub fn stem_index(paths: &[String]) -> HashMap<String, String> {
    paths
        .iter()
        .map(|p| (path_stem(p).to_string(), p.clone()))
        .collect()
}
