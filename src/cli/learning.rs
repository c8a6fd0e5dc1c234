//! Learning command - outcome statistics, candidates and policy suggestions

use super::project_root;
use crate::learning::{
    aggregate_by_action_kind, aggregate_by_smell_action, deny_candidates, whitelist_candidates,
    LearningStats, LearningStore, TargetStats,
};
use crate::policy::{suggest_policy_from_telemetry, Telemetry, Whitelist};
use anyhow::{Context, Result};
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const TELEMETRY_WINDOW: usize = 20;

#[derive(Serialize)]
struct LearningOutput {
    records: usize,
    by_smell_action: LearningStats,
    by_action_kind: LearningStats,
    deny_candidates: Vec<TargetStats>,
    whitelist_candidates: Vec<TargetStats>,
    telemetry: Telemetry,
    suggestions: BTreeMap<String, String>,
}

/// Run the learning command
pub fn run(path: &Path, top: usize, json: bool, whitelist_draft: bool, allow_auto: bool) -> Result<()> {
    let root = project_root(path)?;
    let store = LearningStore::for_project(&root);
    let records = store
        .load_all()
        .with_context(|| format!("Failed to read {}", store.path().display()))?;

    let telemetry = Telemetry::from_records(&records, TELEMETRY_WINDOW);
    let output = LearningOutput {
        records: records.len(),
        by_smell_action: aggregate_by_smell_action(&records),
        by_action_kind: aggregate_by_action_kind(&records),
        deny_candidates: deny_candidates(&records, top),
        whitelist_candidates: whitelist_candidates(&records, top),
        telemetry,
        suggestions: suggest_policy_from_telemetry(&telemetry),
    };

    let drafted = if whitelist_draft {
        let whitelist = Whitelist::draft_from_candidates(&output.whitelist_candidates, allow_auto);
        let written = whitelist
            .save(&root)
            .context("Failed to write operation whitelist")?;
        Some((whitelist.operations.len(), written))
    } else {
        None
    };

    if json {
        let content =
            serde_json::to_string_pretty(&output).context("Failed to serialize learning stats")?;
        println!("{}", content);
        return Ok(());
    }

    print_output(&output);
    if let Some((count, written)) = drafted {
        println!(
            "\n  {} Drafted {} whitelist entries -> {}",
            style("[OK]").green(),
            count,
            style(written.display()).dim()
        );
    }
    Ok(())
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{:.0}%", r * 100.0))
}

fn print_output(output: &LearningOutput) {
    println!("\narchfix learning ({} runs)\n", style(output.records).cyan());
    if output.records == 0 {
        println!(
            "  {} No apply runs recorded yet. Run {}",
            style("[--]").dim(),
            style("archfix apply .").cyan()
        );
        return;
    }

    println!("  By smell and action:");
    for (key, stats) in &output.by_smell_action {
        println!(
            "    {:<40} {:>3} runs  {:>3} ok  {:>3} fail  {:>5.1}%",
            key,
            stats.total,
            stats.success,
            stats.fail,
            stats.success_rate() * 100.0
        );
    }

    if !output.deny_candidates.is_empty() {
        println!("\n  {} Deny candidates:", style("[!!]").red());
        for c in &output.deny_candidates {
            println!(
                "    {} {} ({}) {}/{} verified",
                c.action_kind,
                style(&c.target_file).cyan(),
                c.smell_type,
                c.verify_success,
                c.total
            );
        }
    }
    if !output.whitelist_candidates.is_empty() {
        println!("\n  {} Whitelist candidates:", style("[OK]").green());
        for c in &output.whitelist_candidates {
            println!(
                "    {} {} ({}) {:.0}% verified",
                c.action_kind,
                style(&c.target_file).cyan(),
                c.smell_type,
                c.verify_success_rate * 100.0
            );
        }
    }

    println!(
        "\n  Telemetry: apply rate {}, rollback rate {}",
        format_rate(output.telemetry.apply_rate),
        format_rate(output.telemetry.rollback_rate)
    );
    for (key, value) in &output.suggestions {
        println!("    Suggest: {}={}", style(key).yellow(), value);
    }
}
