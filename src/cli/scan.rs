//! Scan command - graph, smells, health and trends

use super::project_root;
use crate::config::AppConfig;
use crate::detectors::{remediation_hint, severity_to_level};
use crate::history::Trend;
use crate::pipeline::{Analysis, Pipeline};
use crate::scoring::HealthLevel;
use anyhow::{Context, Result};
use console::style;
use std::path::Path;

const MAX_SMELLS_SHOWN: usize = 15;
const MAX_PRIORITIES_SHOWN: usize = 5;

/// Run the scan command
pub fn run(path: &Path, json: bool, window: usize, no_history: bool) -> Result<()> {
    let root = project_root(path)?;
    let config = AppConfig::load(&root, None);
    let pipeline = Pipeline::new(&root)
        .with_exclude(config.scan_exclude.clone())
        .with_window(window);
    let analysis = pipeline
        .analyze()
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    if !no_history {
        pipeline
            .record_history(&analysis)
            .context("Failed to record history")?;
    }

    if json {
        let report = serde_json::to_string_pretty(&analysis.report(&root))
            .context("Failed to serialize analysis")?;
        println!("{}", report);
        return Ok(());
    }

    print_analysis(&root, &analysis);
    Ok(())
}

fn trend_label(trend: Trend) -> String {
    match trend {
        Trend::Increasing => style("increasing").red().to_string(),
        Trend::Decreasing => style("decreasing").green().to_string(),
        Trend::Stable => style("stable").dim().to_string(),
        Trend::InsufficientData => style("n/a").dim().to_string(),
    }
}

fn print_analysis(root: &Path, analysis: &Analysis) {
    println!("\narchfix scan\n");
    println!("  Project: {}", style(root.display()).cyan());

    let graph = analysis.graph.summary();
    println!(
        "  Graph: {} modules, {} imports, {} cycles",
        style(graph.nodes).cyan(),
        style(graph.edges).cyan(),
        style(graph.cycles).cyan()
    );
    println!("  Maturity: {}", analysis.summary.maturity);

    let score = style(analysis.health.score);
    let score = match analysis.health.level {
        HealthLevel::High => score.green(),
        HealthLevel::Medium => score.yellow(),
        HealthLevel::Low => score.red(),
    };
    println!("  Health: {} ({})", score.bold(), analysis.health.level);
    for factor in &analysis.health.factors {
        println!("      {}", style(factor).dim());
    }

    println!(
        "  Trends: complexity {}  smells {}  centralization {}",
        trend_label(analysis.trends.complexity),
        trend_label(analysis.trends.smells),
        trend_label(analysis.trends.centralization)
    );
    for regression in &analysis.regressions {
        println!("  {} {}", style("[REGRESSION]").red(), regression);
    }

    println!();
    if analysis.smells.is_empty() {
        println!("  {} No architectural smells found", style("[OK]").green());
    } else {
        println!("  Smells ({}):", analysis.smells.len());
        for smell in analysis.smells.iter().take(MAX_SMELLS_SHOWN) {
            let nodes: Vec<&str> = smell.nodes.iter().take(3).map(String::as_str).collect();
            println!(
                "    {:<8} {:<18} {}",
                style(severity_to_level(smell.severity)).yellow(),
                smell.smell_type,
                nodes.join(", ")
            );
            println!("             {}", style(remediation_hint(smell.smell_type)).dim());
        }
        if analysis.smells.len() > MAX_SMELLS_SHOWN {
            println!(
                "    {} more...",
                style(analysis.smells.len() - MAX_SMELLS_SHOWN).dim()
            );
        }
    }

    if !analysis.priorities.is_empty() {
        println!("\n  Priorities:");
        for (rank, module) in analysis
            .priorities
            .iter()
            .take(MAX_PRIORITIES_SHOWN)
            .enumerate()
        {
            println!(
                "    {}. {} ({:.2})",
                rank + 1,
                style(&module.name).cyan(),
                module.score
            );
        }
    }

    if !analysis.recommendations.is_empty() {
        println!("\n  Recommendations:");
        for recommendation in &analysis.recommendations {
            println!("    - {}", recommendation);
        }
    }

    println!(
        "\n  Next: {}",
        style("archfix plan . --action-plan actions.json").cyan()
    );
}
