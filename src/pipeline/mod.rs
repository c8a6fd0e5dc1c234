//! Analysis pipeline
//!
//! Orchestrates the read-only half of archfix:
//! 1. Scan Python files into a self-map
//! 2. Build the import graph
//! 3. Run smell detectors
//! 4. Summarize and rank modules
//! 5. Compare against history and score health
//!
//! Planning builds on the resulting [`Analysis`].

use crate::detectors::{build_recommendations, build_summary, detect_smells, ArchSummary};
use crate::error::ArchResult;
use crate::graph::{scan_project, GraphSummary, ProjectGraph, SelfMap};
use crate::history::{ArchitectureHistory, HistoryPoint, Trends, DEFAULT_WINDOW};
use crate::learning::LearningStats;
use crate::models::{ArchSmell, PatchPlan};
use crate::planner::{
    build_action_plan, build_architecture_plan, build_patch_plan, ActionPlan, ArchitecturePlan,
    GeneratedFrom, PlannerConfig, PlannerInputs,
};
use crate::scoring::{compute_health, prioritize, score_modules, HealthReport, ScoredModule};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything derived from one scan
#[derive(Debug, Clone)]
pub struct Analysis {
    pub self_map: SelfMap,
    pub graph: ProjectGraph,
    pub smells: Vec<ArchSmell>,
    pub summary: ArchSummary,
    pub recommendations: Vec<String>,
    pub trends: Trends,
    pub regressions: Vec<String>,
    pub health: HealthReport,
    pub priorities: Vec<ScoredModule>,
}

/// JSON view of an [`Analysis`] for `archfix scan --json`
#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub project_root: String,
    pub graph: GraphSummary,
    pub summary: &'a ArchSummary,
    pub smells: &'a [ArchSmell],
    pub health: &'a HealthReport,
    pub trends: Trends,
    pub regressions: &'a [String],
    pub recommendations: &'a [String],
    pub priorities: &'a [ScoredModule],
}

impl Analysis {
    pub fn report(&self, root: &Path) -> AnalysisReport<'_> {
        AnalysisReport {
            project_root: root.display().to_string(),
            graph: self.graph.summary(),
            summary: &self.summary,
            smells: &self.smells,
            health: &self.health,
            trends: self.trends,
            regressions: &self.regressions,
            recommendations: &self.recommendations,
            priorities: &self.priorities,
        }
    }
}

pub struct Pipeline {
    root: PathBuf,
    exclude: Vec<String>,
    window: usize,
}

impl Pipeline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude: Vec::new(),
            window: DEFAULT_WINDOW,
        }
    }

    /// Extra directory names to skip while scanning
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// History window for trends and regressions
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(2);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the project and derive smells, summary, trends and health
    pub fn analyze(&self) -> ArchResult<Analysis> {
        let self_map = scan_project(&self.root, &self.exclude)?;
        let graph = ProjectGraph::from_self_map(&self_map);
        let smells = detect_smells(&graph);
        let summary = build_summary(&graph, &smells);
        let recommendations = build_recommendations(&graph, &smells);

        let history = ArchitectureHistory::for_project(&self.root);
        let trends = history.trend(self.window);
        let regressions = history.detect_regressions(self.window);
        let health = compute_health(&smells, &trends);
        let priorities = prioritize(score_modules(&smells, &summary.risks, &trends));
        info!(
            "Analyzed {} modules: {} smells, health {} ({})",
            graph.nodes().len(),
            smells.len(),
            health.score,
            health.level
        );
        Ok(Analysis {
            self_map,
            graph,
            smells,
            summary,
            recommendations,
            trends,
            regressions,
            health,
            priorities,
        })
    }

    /// Append a snapshot of this analysis to `.archfix/history.json`
    pub fn record_history(&self, analysis: &Analysis) -> ArchResult<()> {
        let mut history = ArchitectureHistory::for_project(&self.root);
        let point = HistoryPoint::snapshot(&analysis.graph, &analysis.smells, Some(analysis.health.score));
        history.append(point)?;
        debug!("History now has {} points", history.points().len());
        Ok(())
    }

    pub fn patch_plan(
        &self,
        analysis: &Analysis,
        config: &PlannerConfig,
        learning: Option<&LearningStats>,
    ) -> PatchPlan {
        build_patch_plan(&PlannerInputs {
            project_root: &self.root,
            graph: &analysis.graph,
            self_map: Some(&analysis.self_map),
            smells: &analysis.smells,
            summary_risks: &analysis.summary.risks,
            trends: analysis.trends,
            learning,
            config,
        })
    }

    /// Explainable per-module steps and the action plan derived from them
    pub fn architecture_plan(
        &self,
        analysis: &Analysis,
        learning: Option<&LearningStats>,
    ) -> (ArchitecturePlan, ActionPlan) {
        let generated_from = GeneratedFrom {
            summary_risks: analysis.summary.risks.clone(),
            history_trends: analysis.trends,
            history_regressions: analysis.regressions.clone(),
            priorities_count: analysis.priorities.len(),
        };
        let plan = build_architecture_plan(
            &self.root.display().to_string(),
            &analysis.priorities,
            &analysis.smells,
            generated_from,
        );
        let actions = build_action_plan(&plan, learning);
        (plan, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_analyze_cycle_project() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.py", "import b\n");
        write(dir.path(), "b.py", "import a\n");
        let pipeline = Pipeline::new(dir.path());
        let analysis = pipeline.analyze().unwrap();
        assert_eq!(analysis.graph.nodes().len(), 2);
        assert!(analysis
            .smells
            .iter()
            .any(|s| s.smell_type == crate::models::SmellType::CyclicDependency));
        assert!(analysis.health.score < 80);

        pipeline.record_history(&analysis).unwrap();
        assert!(dir.path().join(".archfix/history.json").exists());

        let plan = pipeline.patch_plan(&analysis, &PlannerConfig::default(), None);
        assert_eq!(
            plan.operations[0].kind,
            crate::models::ActionKind::RemoveCyclicImport
        );
        let (arch, actions) = pipeline.architecture_plan(&analysis, None);
        assert_eq!(arch.steps.len(), actions.actions.len());
    }

    #[test]
    fn test_report_serializes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "solo.py", "x = 1\n");
        let analysis = Pipeline::new(dir.path()).analyze().unwrap();
        let json = serde_json::to_value(analysis.report(dir.path())).unwrap();
        assert_eq!(json["graph"]["nodes"], 1);
        assert!(json["smells"].as_array().unwrap().is_empty());
    }
}
