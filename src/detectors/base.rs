//! Base detector trait and shared statistics
//!
//! This module defines the core abstractions for smell detection:
//! - `SmellDetector` trait that all detectors implement
//! - `ThresholdConfig` for the statistical cut-offs
//! - Population mean / standard deviation helpers

use crate::graph::ProjectGraph;
use crate::models::{path_stem, ArchSmell, SmellType};

/// Tunable thresholds shared by the statistical detectors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdConfig {
    /// Multiplier applied to the standard deviation
    pub sigma_multiplier: f64,
    /// Absolute floor for fan-in / fan-out based rules
    pub min_degree: usize,
    /// Maximum allowed value on the opposite side (fan-out for bottlenecks)
    pub max_opposite: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sigma_multiplier: 2.0,
            min_degree: 3,
            max_opposite: 1,
        }
    }
}

/// Mean and population standard deviation of a sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DegreeStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl DegreeStats {
    pub fn from_values(values: &[usize]) -> Self {
        match values.len() {
            0 => Self::default(),
            1 => Self {
                mean: values[0] as f64,
                std_dev: 0.0,
            },
            n => {
                let n = n as f64;
                let mean = values.iter().sum::<usize>() as f64 / n;
                let variance = values
                    .iter()
                    .map(|v| {
                        let d = *v as f64 - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / n;
                Self {
                    mean,
                    std_dev: variance.sqrt(),
                }
            }
        }
    }

    /// `mean + k * sigma`
    pub fn threshold(&self, sigma_multiplier: f64) -> f64 {
        self.mean + sigma_multiplier * self.std_dev
    }
}

/// Trait for all architecture smell detectors
///
/// Detectors are pure functions of the graph: same graph, same smells.
pub trait SmellDetector: Send + Sync {
    /// Unique identifier for this detector
    fn name(&self) -> &'static str;

    /// Human-readable description of what this detector finds
    fn description(&self) -> &'static str;

    /// The smell type this detector emits
    fn smell_type(&self) -> SmellType;

    /// Run detection over the graph
    fn detect(&self, graph: &ProjectGraph) -> Vec<ArchSmell>;
}

/// Modules named `*_api.py` are deliberate entry points
pub fn is_api_module(node: &str) -> bool {
    path_stem(node).ends_with("_api")
}
