//! God module detector
//!
//! Flags modules whose total degree (fan-in + fan-out) sits more than
//! `sigma_multiplier` standard deviations above the mean. A perfectly
//! uniform graph (zero deviation) has no god modules.

use super::base::{is_api_module, DegreeStats, SmellDetector, ThresholdConfig};
use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use tracing::debug;

/// Detects over-connected modules
#[derive(Debug, Clone, Default)]
pub struct GodModuleDetector {
    config: ThresholdConfig,
}

impl GodModuleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ThresholdConfig) -> Self {
        Self { config }
    }
}

impl SmellDetector for GodModuleDetector {
    fn name(&self) -> &'static str {
        "GodModuleDetector"
    }

    fn description(&self) -> &'static str {
        "Detects modules with outlying total degree"
    }

    fn smell_type(&self) -> SmellType {
        SmellType::GodModule
    }

    fn detect(&self, graph: &ProjectGraph) -> Vec<ArchSmell> {
        let fan = graph.fan_in_out();
        let degrees: Vec<usize> = fan.values().map(|(i, o)| i + o).collect();
        let stats = DegreeStats::from_values(&degrees);
        if stats.std_dev == 0.0 {
            return vec![];
        }
        let threshold = stats.threshold(self.config.sigma_multiplier);

        let smells: Vec<ArchSmell> = fan
            .iter()
            .filter(|(node, _)| !is_api_module(node))
            .filter_map(|(node, (fan_in, fan_out))| {
                let degree = fan_in + fan_out;
                (degree as f64 > threshold).then(|| ArchSmell {
                    smell_type: SmellType::GodModule,
                    nodes: vec![node.clone()],
                    severity: degree as f64,
                    description: format!(
                        "High total degree {} (fan-in + fan-out), threshold {:.2}",
                        degree, threshold
                    ),
                })
            })
            .collect();

        debug!("{} found {} modules", self.name(), smells.len());
        smells
    }
}
