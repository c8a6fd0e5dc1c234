//! Plan command - build and persist a patch plan

use super::{default_plan_path, project_root};
use crate::config::AppConfig;
use crate::learning::{LearningStats, LearningStore};
use crate::pipeline::Pipeline;
use crate::planner::{ActionPlan, ArchitecturePlan};
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::path::Path;
use tracing::warn;

#[derive(Serialize)]
struct PlanBundle<'a> {
    architecture_plan: &'a ArchitecturePlan,
    action_plan: &'a ActionPlan,
}

/// Smell/action success stats, or none when the store is unreadable
pub(crate) fn load_learning_stats(root: &Path) -> Option<LearningStats> {
    match LearningStore::for_project(root).aggregate_by_smell_action() {
        Ok(stats) if !stats.is_empty() => Some(stats),
        Ok(_) => None,
        Err(e) => {
            warn!("Ignoring learning store: {}", e);
            None
        }
    }
}

/// Run the plan command
pub fn run(
    path: &Path,
    output: Option<&Path>,
    clean_imports: bool,
    action_plan: Option<&Path>,
    json: bool,
) -> Result<()> {
    let root = project_root(path)?;
    let config = AppConfig::load(&root, None);
    let pipeline = Pipeline::new(&root).with_exclude(config.scan_exclude.clone());
    let analysis = pipeline
        .analyze()
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let mut planner_config = config.planner.clone();
    planner_config.clean_imports |= clean_imports;
    let learning = load_learning_stats(&root);
    let plan = pipeline.patch_plan(&analysis, &planner_config, learning.as_ref());

    let plan_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_plan_path(&root));
    plan.save(&plan_path)
        .with_context(|| format!("Failed to write plan to {}", plan_path.display()))?;

    if let Some(action_path) = action_plan {
        let (architecture_plan, actions) = pipeline.architecture_plan(&analysis, learning.as_ref());
        let bundle = PlanBundle {
            architecture_plan: &architecture_plan,
            action_plan: &actions,
        };
        let content =
            serde_json::to_string_pretty(&bundle).context("Failed to serialize action plan")?;
        std::fs::write(action_path, content)
            .with_context(|| format!("Failed to write {}", action_path.display()))?;
        if !json {
            println!(
                "  {} Action plan: {} steps -> {}",
                style("[OK]").green(),
                actions.actions.len(),
                style(action_path.display()).dim()
            );
        }
    }

    if json {
        let content = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{}", content);
        return Ok(());
    }

    if plan.operations.is_empty() {
        println!("\n  {} Nothing to do: no operations planned", style("[OK]").green());
    } else {
        println!("\n  Patch plan ({} operations):", plan.operations.len());
        for op in &plan.operations {
            println!(
                "    {:<22} {}",
                style(op.kind).yellow(),
                style(&op.target_file).cyan()
            );
            println!("      {}", style(&op.description).dim());
        }
    }
    println!("\n  Plan written to {}", style(plan_path.display()).cyan());
    println!("  Next: {}", style("archfix apply . --dry-run").cyan());
    Ok(())
}
