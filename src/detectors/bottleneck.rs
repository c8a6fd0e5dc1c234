//! Bottleneck detector
//!
//! A bottleneck is imported by many modules but depends on almost nothing
//! itself: `fan_in >= max(min_degree, mean_in + k*sigma_in)` and
//! `fan_out <= max_opposite`.

use super::base::{is_api_module, DegreeStats, SmellDetector, ThresholdConfig};
use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use tracing::debug;

/// Detects heavily imported leaf-like modules
#[derive(Debug, Clone, Default)]
pub struct BottleneckDetector {
    config: ThresholdConfig,
}

impl BottleneckDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ThresholdConfig) -> Self {
        Self { config }
    }
}

impl SmellDetector for BottleneckDetector {
    fn name(&self) -> &'static str {
        "BottleneckDetector"
    }

    fn description(&self) -> &'static str {
        "Detects modules with outlying fan-in and little fan-out"
    }

    fn smell_type(&self) -> SmellType {
        SmellType::Bottleneck
    }

    fn detect(&self, graph: &ProjectGraph) -> Vec<ArchSmell> {
        let fan = graph.fan_in_out();
        let fan_ins: Vec<usize> = fan.values().map(|f| f.0).collect();
        let stats = DegreeStats::from_values(&fan_ins);
        let floor = (self.config.min_degree as f64).max(stats.threshold(self.config.sigma_multiplier));

        let smells: Vec<ArchSmell> = fan
            .iter()
            .filter(|(node, _)| !is_api_module(node))
            .filter(|(_, (fan_in, fan_out))| {
                *fan_in as f64 >= floor && *fan_out <= self.config.max_opposite
            })
            .map(|(node, (fan_in, fan_out))| ArchSmell {
                smell_type: SmellType::Bottleneck,
                nodes: vec![node.clone()],
                severity: *fan_in as f64,
                description: format!("High fan-in {} with low fan-out {}", fan_in, fan_out),
            })
            .collect();

        debug!("{} found {} modules", self.name(), smells.len());
        smells
    }
}
