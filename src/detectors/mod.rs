//! Architecture smell detectors
//!
//! Four rules run over the import graph:
//!
//! ```text
//!   ProjectGraph ──┬── CyclicDependencyDetector  (structural: DFS cycles)
//!                  ├── GodModuleDetector         (degree > mean + 2σ)
//!                  ├── BottleneckDetector        (high fan-in, fan-out ≤ 1)
//!                  └── HubDetector               (high fan-out, fan-in ≤ 1)
//!                             │
//!                             ▼
//!              Vec<ArchSmell>, severity descending
//! ```
//!
//! A module may carry more than one smell type. Modules named `*_api.py`
//! are exempt from the statistical rules.

pub mod base;
mod bottleneck;
mod cyclic_dependency;
mod god_module;
mod hub;
pub mod summary;

pub use base::{DegreeStats, SmellDetector, ThresholdConfig};
pub use bottleneck::BottleneckDetector;
pub use cyclic_dependency::CyclicDependencyDetector;
pub use god_module::GodModuleDetector;
pub use hub::HubDetector;
pub use summary::{build_recommendations, build_summary, ArchSummary};

use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use serde::{Deserialize, Serialize};
use tracing::info;

/// All smell detectors with default thresholds
pub fn default_detectors() -> Vec<Box<dyn SmellDetector>> {
    vec![
        Box::new(CyclicDependencyDetector::new()),
        Box::new(GodModuleDetector::new()),
        Box::new(BottleneckDetector::new()),
        Box::new(HubDetector::new()),
    ]
}

/// Run every detector and sort the combined output by severity (stable)
pub fn detect_smells(graph: &ProjectGraph) -> Vec<ArchSmell> {
    let mut smells: Vec<ArchSmell> = default_detectors()
        .iter()
        .flat_map(|d| d.detect(graph))
        .collect();
    smells.sort_by(|a, b| b.severity.total_cmp(&a.severity));
    info!(
        "Detected {} architecture smells over {} modules",
        smells.len(),
        graph.nodes().len()
    );
    smells
}

/// Qualitative severity bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeverityLevel::Low => write!(f, "low"),
            SeverityLevel::Medium => write!(f, "medium"),
            SeverityLevel::High => write!(f, "high"),
            SeverityLevel::Critical => write!(f, "critical"),
        }
    }
}

pub fn severity_to_level(severity: f64) -> SeverityLevel {
    if severity < 5.0 {
        SeverityLevel::Low
    } else if severity < 12.0 {
        SeverityLevel::Medium
    } else if severity < 20.0 {
        SeverityLevel::High
    } else {
        SeverityLevel::Critical
    }
}

/// One-line remediation advice per smell type
pub fn remediation_hint(smell_type: SmellType) -> &'static str {
    match smell_type {
        SmellType::GodModule => {
            "Consider splitting into smaller modules; extract coherent sub-responsibilities."
        }
        SmellType::Bottleneck => {
            "Introduce facade or adapter to distribute dependents; avoid single point of failure."
        }
        SmellType::Hub => "Extract coherent sub-graphs; consider splitting by domain or layer.",
        SmellType::CyclicDependency => {
            "Break the cycle: invert dependency, introduce abstraction layer, or extract shared code."
        }
    }
}
