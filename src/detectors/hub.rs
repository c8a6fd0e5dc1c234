//! Hub detector
//!
//! The mirror image of a bottleneck: a module that imports many others but
//! is itself imported by at most `max_opposite` modules.

use super::base::{is_api_module, DegreeStats, SmellDetector, ThresholdConfig};
use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use tracing::debug;

/// Detects modules with outlying fan-out
#[derive(Debug, Clone, Default)]
pub struct HubDetector {
    config: ThresholdConfig,
}

impl HubDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ThresholdConfig) -> Self {
        Self { config }
    }
}

impl SmellDetector for HubDetector {
    fn name(&self) -> &'static str {
        "HubDetector"
    }

    fn description(&self) -> &'static str {
        "Detects modules with outlying fan-out and little fan-in"
    }

    fn smell_type(&self) -> SmellType {
        SmellType::Hub
    }

    fn detect(&self, graph: &ProjectGraph) -> Vec<ArchSmell> {
        let fan = graph.fan_in_out();
        let fan_outs: Vec<usize> = fan.values().map(|f| f.1).collect();
        let stats = DegreeStats::from_values(&fan_outs);
        let floor = (self.config.min_degree as f64).max(stats.threshold(self.config.sigma_multiplier));

        let smells: Vec<ArchSmell> = fan
            .iter()
            .filter(|(node, _)| !is_api_module(node))
            .filter(|(_, (fan_in, fan_out))| {
                *fan_out as f64 >= floor && *fan_in <= self.config.max_opposite
            })
            .map(|(node, (fan_in, fan_out))| ArchSmell {
                smell_type: SmellType::Hub,
                nodes: vec![node.clone()],
                severity: *fan_out as f64,
                description: format!("High fan-out {} with low fan-in {}", fan_out, fan_in),
            })
            .collect();

        debug!("{} found {} modules", self.name(), smells.len());
        smells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fan_out_star(center: &str) -> ProjectGraph {
        let deps: Vec<String> = (0..8).map(|i| format!("dep{}.py", i)).collect();
        let pairs: Vec<(&str, &str)> = deps.iter().map(|d| (center, d.as_str())).collect();
        ProjectGraph::from_pairs(&pairs)
    }

    #[test]
    fn test_detects_hub() {
        let smells = HubDetector::new().detect(&fan_out_star("main.py"));
        assert_eq!(smells.len(), 1);
        assert_eq!(smells[0].nodes, vec!["main.py"]);
        assert_eq!(smells[0].severity, 8.0);
        assert_eq!(smells[0].description, "High fan-out 8 with low fan-in 0");
    }

    #[test]
    fn test_api_exempt() {
        assert!(HubDetector::new().detect(&fan_out_star("cli_api.py")).is_empty());
    }

    #[test]
    fn test_imported_hub_not_flagged() {
        let mut pairs: Vec<(&str, &str)> = vec![("x.py", "main.py"), ("y.py", "main.py")];
        let deps: Vec<String> = (0..8).map(|i| format!("dep{}.py", i)).collect();
        pairs.extend(deps.iter().map(|d| ("main.py", d.as_str())));
        assert!(HubDetector::new().detect(&ProjectGraph::from_pairs(&pairs)).is_empty());
    }
}
