//! Architecture history
//!
//! Append-only snapshots of graph and smell counters, stored in
//! `.archfix/history.json`. Trends compare the oldest and newest point of a
//! trailing window; regressions flag counters that grew across it.

use crate::error::{ArchError, ArchResult};
use crate::graph::ProjectGraph;
use crate::models::{ArchSmell, SmellType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_WINDOW: usize = 5;
pub const HISTORY_FILE: &str = "history.json";

/// Direction of a metric over the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
    InsufficientData,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Increasing => write!(f, "increasing"),
            Trend::Decreasing => write!(f, "decreasing"),
            Trend::Stable => write!(f, "stable"),
            Trend::InsufficientData => write!(f, "insufficient_data"),
        }
    }
}

impl Trend {
    fn between(first: usize, last: usize) -> Self {
        match last.cmp(&first) {
            std::cmp::Ordering::Greater => Trend::Increasing,
            std::cmp::Ordering::Less => Trend::Decreasing,
            std::cmp::Ordering::Equal => Trend::Stable,
        }
    }
}

/// Trends of the three tracked dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Trends {
    pub complexity: Trend,
    pub smells: Trend,
    pub centralization: Trend,
}

impl Trends {
    pub fn insufficient() -> Self {
        Self {
            complexity: Trend::InsufficientData,
            smells: Trend::InsufficientData,
            centralization: Trend::InsufficientData,
        }
    }
}

/// One snapshot of the project's architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub modules: usize,
    #[serde(default)]
    pub dependencies: usize,
    #[serde(default)]
    pub cycles: usize,
    #[serde(default)]
    pub max_degree: usize,
    #[serde(default)]
    pub total_smells: usize,
    #[serde(default)]
    pub smell_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub health_score: Option<i32>,
}

impl HistoryPoint {
    pub fn snapshot(graph: &ProjectGraph, smells: &[ArchSmell], health_score: Option<i32>) -> Self {
        let summary = graph.summary();
        let mut smell_counts = BTreeMap::new();
        for smell in smells {
            *smell_counts
                .entry(smell.smell_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        Self {
            timestamp: Utc::now(),
            modules: summary.nodes,
            dependencies: summary.edges,
            cycles: summary.cycles,
            max_degree: summary.max_degree,
            total_smells: smells.len(),
            smell_counts,
            health_score,
        }
    }

    fn count(&self, smell_type: SmellType) -> usize {
        self.smell_counts
            .get(smell_type.as_str())
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    history: Vec<HistoryPoint>,
}

/// Append-only history backed by a JSON file
#[derive(Debug, Clone)]
pub struct ArchitectureHistory {
    path: PathBuf,
    points: Vec<HistoryPoint>,
}

impl ArchitectureHistory {
    pub fn for_project(root: &Path) -> Self {
        Self::load(&root.join(crate::learning::STATE_DIR).join(HISTORY_FILE))
    }

    /// Load history; a missing or unreadable file starts an empty history
    pub fn load(path: &Path) -> Self {
        let points = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<HistoryFile>(&content) {
                Ok(file) => file.history,
                Err(e) => {
                    warn!("Ignoring corrupt history {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(_) => {
                debug!("No history at {}", path.display());
                Vec::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            points,
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn append(&mut self, point: HistoryPoint) -> ArchResult<()> {
        self.points.push(point);
        self.save()
    }

    fn save(&self) -> ArchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        let file = HistoryFile {
            history: self.points.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ArchError::Config(format!("history serialization: {}", e)))?;
        std::fs::write(&self.path, json).map_err(|e| ArchError::io(&self.path, e))
    }

    fn window(&self, window: usize) -> &[HistoryPoint] {
        if window == 0 || window > self.points.len() {
            return &self.points;
        }
        &self.points[self.points.len() - window..]
    }

    pub fn trend(&self, window: usize) -> Trends {
        let pts = self.window(window);
        let (Some(first), Some(last)) = (pts.first(), pts.last()) else {
            return Trends::insufficient();
        };
        if pts.len() < 2 {
            return Trends::insufficient();
        }
        Trends {
            complexity: Trend::between(
                first.modules + first.dependencies,
                last.modules + last.dependencies,
            ),
            smells: Trend::between(first.total_smells, last.total_smells),
            centralization: Trend::between(first.max_degree, last.max_degree),
        }
    }

    pub fn detect_regressions(&self, window: usize) -> Vec<String> {
        let pts = self.window(window);
        let mut notes = Vec::new();
        if pts.len() < 2 {
            return notes;
        }
        let (oldest, newest) = (&pts[0], &pts[pts.len() - 1]);
        if newest.cycles > oldest.cycles {
            notes.push(format!(
                "Cycles increased: {} → {}",
                oldest.cycles, newest.cycles
            ));
        }
        if newest.total_smells > oldest.total_smells {
            notes.push(format!(
                "Total smells increased: {} → {}",
                oldest.total_smells, newest.total_smells
            ));
        }
        for smell_type in [SmellType::GodModule, SmellType::Bottleneck, SmellType::Hub] {
            let (old_n, new_n) = (oldest.count(smell_type), newest.count(smell_type));
            if new_n > old_n {
                notes.push(format!("{} increased: {} → {}", smell_type, old_n, new_n));
            }
        }
        if oldest.max_degree >= 2 && newest.max_degree as f64 > oldest.max_degree as f64 * 1.5 {
            notes.push(format!(
                "Centralization increased significantly (max degree {} → {})",
                oldest.max_degree, newest.max_degree
            ));
        }
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(modules: usize, smells: usize, max_degree: usize, hubs: usize) -> HistoryPoint {
        let mut smell_counts = BTreeMap::new();
        if hubs > 0 {
            smell_counts.insert("hub".to_string(), hubs);
        }
        HistoryPoint {
            timestamp: Utc::now(),
            modules,
            dependencies: 0,
            cycles: 0,
            max_degree,
            total_smells: smells,
            smell_counts,
            health_score: None,
        }
    }

    fn history(points: Vec<HistoryPoint>) -> ArchitectureHistory {
        ArchitectureHistory {
            path: PathBuf::from("unused.json"),
            points,
        }
    }

    #[test]
    fn test_trend_insufficient() {
        assert_eq!(history(vec![]).trend(5), Trends::insufficient());
        assert_eq!(history(vec![point(1, 1, 1, 0)]).trend(5), Trends::insufficient());
    }

    #[test]
    fn test_trend_first_vs_last() {
        let h = history(vec![point(5, 3, 4, 0), point(9, 1, 1, 0), point(6, 2, 4, 0)]);
        let trends = h.trend(5);
        assert_eq!(trends.complexity, Trend::Increasing);
        assert_eq!(trends.smells, Trend::Decreasing);
        assert_eq!(trends.centralization, Trend::Stable);
    }

    #[test]
    fn test_trend_window() {
        let h = history(vec![point(1, 9, 1, 0), point(5, 2, 1, 0), point(5, 3, 1, 0)]);
        assert_eq!(h.trend(2).smells, Trend::Increasing);
        assert_eq!(h.trend(3).smells, Trend::Decreasing);
    }

    #[test]
    fn test_detect_regressions() {
        let h = history(vec![point(5, 1, 2, 0), point(5, 4, 4, 2)]);
        let notes = h.detect_regressions(5);
        assert!(notes.contains(&"Total smells increased: 1 → 4".to_string()));
        assert!(notes.contains(&"hub increased: 0 → 2".to_string()));
        assert!(notes
            .iter()
            .any(|n| n.starts_with("Centralization increased significantly")));
    }

    #[test]
    fn test_append_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".archfix/history.json");
        let mut h = ArchitectureHistory::load(&path);
        h.append(point(1, 0, 0, 0)).unwrap();
        h.append(point(2, 0, 0, 0)).unwrap();
        let reloaded = ArchitectureHistory::load(&path);
        assert_eq!(reloaded.points().len(), 2);
        assert_eq!(reloaded.trend(5).complexity, Trend::Increasing);
    }
}
