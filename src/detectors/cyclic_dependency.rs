//! Cyclic dependency detector
//!
//! Cycles come from the graph's depth-first search, which may report the
//! same cycle under different rotations. Each cycle is normalized to start
//! at its lexicographically smallest member before deduplication, so every
//! distinct cycle yields exactly one smell.

use super::base::SmellDetector;
use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use std::collections::HashSet;
use tracing::debug;

/// Detects import cycles
#[derive(Debug, Clone, Default)]
pub struct CyclicDependencyDetector;

impl CyclicDependencyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Rotate a cycle to start with its smallest element
    pub fn normalize_cycle(cycle: &[String]) -> Vec<String> {
        if cycle.is_empty() {
            return vec![];
        }

        let min_idx = cycle
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| *v)
            .map(|(i, _)| i)
            .unwrap_or(0);

        let mut normalized = Vec::with_capacity(cycle.len());
        normalized.extend_from_slice(&cycle[min_idx..]);
        normalized.extend_from_slice(&cycle[..min_idx]);
        normalized
    }

    /// `len * (1 + average fan-in of the members)`
    fn severity(cycle: &[String], graph: &ProjectGraph) -> f64 {
        let fan = graph.fan_in_out();
        let total_in: usize = cycle
            .iter()
            .map(|n| fan.get(n).map(|f| f.0).unwrap_or(0))
            .sum();
        let avg_in = total_in as f64 / cycle.len() as f64;
        cycle.len() as f64 * (1.0 + avg_in)
    }
}

impl SmellDetector for CyclicDependencyDetector {
    fn name(&self) -> &'static str {
        "CyclicDependencyDetector"
    }

    fn description(&self) -> &'static str {
        "Detects import cycles between project modules"
    }

    fn smell_type(&self) -> SmellType {
        SmellType::CyclicDependency
    }

    fn detect(&self, graph: &ProjectGraph) -> Vec<ArchSmell> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut smells = Vec::new();

        for cycle in graph.find_cycles() {
            let normalized = Self::normalize_cycle(&cycle);
            if normalized.is_empty() || !seen.insert(normalized.clone()) {
                continue;
            }
            smells.push(ArchSmell {
                smell_type: SmellType::CyclicDependency,
                severity: Self::severity(&normalized, graph),
                description: format!(
                    "Cyclic dependency between {} modules: {}",
                    normalized.len(),
                    normalized.join(" -> ")
                ),
                nodes: normalized,
            });
        }

        debug!("{} found {} cycles", self.name(), smells.len());
        smells
    }
}
