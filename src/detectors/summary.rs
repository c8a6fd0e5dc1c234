//! Architecture summary and recommendations
//!
//! Turns graph counters and smells into a compact portrait of the system.
//! The `risks` strings are consumed by the prioritizer, which parses the
//! module name that follows `"@ "`.

use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemCounts {
    pub modules: usize,
    pub dependencies: usize,
    pub cycles: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CentralModule {
    pub name: String,
    pub fan_in: usize,
    pub fan_out: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchSummary {
    pub system: SystemCounts,
    pub central_modules: Vec<CentralModule>,
    pub risks: Vec<String>,
    pub maturity: String,
}

/// Risk line for one smell, e.g. `hub @ main.py (severity=8.00)`
pub fn risk_line(smell: &ArchSmell) -> String {
    let nodes: Vec<&str> = smell.nodes.iter().take(3).map(String::as_str).collect();
    format!(
        "{} @ {} (severity={:.2})",
        smell.smell_type,
        nodes.join(", "),
        smell.severity
    )
}

/// `smells` is expected to be sorted by severity already
pub fn build_summary(graph: &ProjectGraph, smells: &[ArchSmell]) -> ArchSummary {
    let fan = graph.fan_in_out();
    let cycles = graph.find_cycles().len();
    let modules = graph.nodes().len();

    let mut by_degree: Vec<(&String, &(usize, usize))> = fan.iter().collect();
    by_degree.sort_by(|a, b| (b.1 .0 + b.1 .1).cmp(&(a.1 .0 + a.1 .1)));
    let central_modules = by_degree
        .into_iter()
        .take(3)
        .map(|(name, (fan_in, fan_out))| CentralModule {
            name: name.clone(),
            fan_in: *fan_in,
            fan_out: *fan_out,
        })
        .collect();

    let has_cycle_smell = smells
        .iter()
        .any(|s| s.smell_type == SmellType::CyclicDependency);
    let maturity = if modules <= 10 && cycles == 0 && !has_cycle_smell {
        "medium-high"
    } else if modules <= 10 && cycles == 0 {
        "medium"
    } else {
        "low"
    };

    ArchSummary {
        system: SystemCounts {
            modules,
            dependencies: graph.edge_count(),
            cycles,
        },
        central_modules,
        risks: smells.iter().take(5).map(risk_line).collect(),
        maturity: maturity.to_string(),
    }
}

fn format_nodes(nodes: &[String], max_n: usize) -> String {
    if nodes.len() <= max_n {
        return nodes.join(", ");
    }
    format!(
        "{} (and {} more)",
        nodes[..max_n].join(", "),
        nodes.len() - max_n
    )
}

/// Actionable advice per smell, deduplicated in first-seen order
pub fn build_recommendations(graph: &ProjectGraph, smells: &[ArchSmell]) -> Vec<String> {
    let fan = graph.fan_in_out();
    let mut recs: Vec<String> = Vec::new();
    for smell in smells {
        let lines: Vec<String> = match smell.smell_type {
            SmellType::CyclicDependency => vec![format!(
                "{}: Cyclic dependency. Recommendation: break the cycle via dependency inversion \
                 or by introducing an abstraction layer that both sides depend on.",
                format_nodes(&smell.nodes, 3)
            )],
            kind => smell
                .nodes
                .iter()
                .map(|n| {
                    let (fi, fo) = fan.get(n).copied().unwrap_or((0, 0));
                    match kind {
                        SmellType::Hub => format!(
                            "{}: High fan-out ({}) with low fan-in ({}). Recommendation: split \
                             this module into smaller responsibilities.",
                            n, fo, fi
                        ),
                        SmellType::Bottleneck => format!(
                            "{}: Bottleneck risk with fan-in {} and fan-out {}. Recommendation: \
                             introduce a facade or boundary so that other modules depend on a \
                             stable interface instead of this concrete implementation.",
                            n, fi, fo
                        ),
                        _ => format!(
                            "{}: God-module candidate (fan-in {}, fan-out {}). Recommendation: \
                             identify coherent sub-responsibilities and extract them into \
                             dedicated modules.",
                            n, fi, fo
                        ),
                    }
                })
                .collect(),
        };
        for line in lines {
            if !recs.contains(&line) {
                recs.push(line);
            }
        }
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::detect_smells;

    #[test]
    fn test_risk_line() {
        let smell = ArchSmell {
            smell_type: SmellType::Hub,
            nodes: vec!["main.py".into()],
            severity: 8.0,
            description: String::new(),
        };
        assert_eq!(risk_line(&smell), "hub @ main.py (severity=8.00)");
    }

    #[test]
    fn test_build_summary() {
        let graph =
            ProjectGraph::from_pairs(&[("a.py", "b.py"), ("b.py", "a.py"), ("c.py", "a.py")]);
        let smells = detect_smells(&graph);
        let summary = build_summary(&graph, &smells);
        assert_eq!(summary.system.modules, 3);
        assert_eq!(summary.system.dependencies, 3);
        assert_eq!(summary.system.cycles, 1);
        assert_eq!(summary.central_modules[0].name, "a.py");
        assert_eq!(summary.maturity, "low");
        assert!(summary.risks[0].starts_with("cyclic_dependency @ a.py, b.py"));
    }

    #[test]
    fn test_recommendations_dedup() {
        let graph = ProjectGraph::from_pairs(&[("a.py", "b.py"), ("b.py", "a.py")]);
        let smell = ArchSmell {
            smell_type: SmellType::CyclicDependency,
            nodes: vec!["a.py".into(), "b.py".into()],
            severity: 4.0,
            description: String::new(),
        };
        let recs = build_recommendations(&graph, &[smell.clone(), smell]);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("a.py, b.py: Cyclic dependency."));
    }
}
