//! Apply command - policy gate, apply, verify, roll back, learn

use super::{default_plan_path, project_root};
use crate::apply::{apply_and_verify, ApplyOptions, ApplyReport, ApplyState};
use crate::config::AppConfig;
use crate::learning::{record_from_report, LearningStore};
use crate::models::PatchPlan;
use crate::pipeline::Pipeline;
use crate::planner::PlannerConfig;
use crate::policy::{
    apply_runtime_policy, PolicyContext, PolicyDecision, PolicyMode, RuntimePolicyOutcome,
    SessionMemory, Whitelist,
};
use anyhow::{bail, Context, Result};
use console::style;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DENY_CANDIDATES_TOP_N: usize = 20;
const DEFAULT_SESSION: &str = "cli";

/// Parsed `archfix apply` flags
#[derive(Debug, Clone, Default)]
pub struct ApplyArgs {
    pub plan: Option<PathBuf>,
    pub mode: Option<PolicyMode>,
    pub dry_run: bool,
    pub backup: bool,
    pub verify: bool,
    pub auto_rollback: bool,
    pub verify_cmd: Option<String>,
    pub verify_timeout: Option<u64>,
    pub reject: Vec<String>,
    pub ignore_campaign: bool,
    pub session: Option<String>,
    pub json: bool,
}

#[derive(Serialize)]
struct ApplyOutput<'a> {
    mode: PolicyMode,
    policy: &'a RuntimePolicyOutcome,
    report: &'a ApplyReport,
}

/// The plan to gate plus the current summary risks for the learning record
fn load_plan(
    root: &Path,
    explicit: Option<&Path>,
    pipeline: &Pipeline,
    planner: &PlannerConfig,
) -> Result<(PatchPlan, Vec<String>)> {
    let analysis = pipeline
        .analyze()
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    let risks = analysis.summary.risks.clone();

    if let Some(path) = explicit {
        let plan = PatchPlan::load(path)
            .with_context(|| format!("Failed to load plan {}", path.display()))?;
        return Ok((plan, risks));
    }
    let default_path = default_plan_path(root);
    if default_path.exists() {
        let plan = PatchPlan::load(&default_path)
            .with_context(|| format!("Failed to load plan {}", default_path.display()))?;
        return Ok((plan, risks));
    }
    info!("No saved plan; building one from a fresh scan");
    let learning = super::plan::load_learning_stats(root);
    let plan = pipeline.patch_plan(&analysis, planner, learning.as_ref());
    Ok((plan, risks))
}

fn build_context(root: &Path, session: &SessionMemory, args: &ApplyArgs) -> PolicyContext {
    let deny_candidates = LearningStore::for_project(root)
        .deny_candidates(DENY_CANDIDATES_TOP_N)
        .unwrap_or_else(|e| {
            warn!("Ignoring learning store: {}", e);
            Vec::new()
        });
    let mut skip_keys = if args.ignore_campaign {
        Default::default()
    } else {
        session.campaign_keys_to_skip()
    };
    skip_keys.extend(args.reject.iter().cloned());
    PolicyContext {
        failure_counts: session.failure_counts(),
        deny_candidates,
        whitelist: Whitelist::load(root),
        skip_keys,
        ..PolicyContext::default()
    }
}

/// Run the apply command
pub fn run(path: &Path, args: ApplyArgs) -> Result<()> {
    let root = project_root(path)?;
    let config = AppConfig::load(&root, args.mode);
    let pipeline = Pipeline::new(&root).with_exclude(config.scan_exclude.clone());
    let (plan, risks) = load_plan(&root, args.plan.as_deref(), &pipeline, &config.planner)?;

    let mut session = SessionMemory::load(&root);
    let context = build_context(&root, &session, &args);
    let outcome = apply_runtime_policy(&plan.operations, &config.policy, &context);
    let kept_plan = PatchPlan::new(plan.project_root.clone(), outcome.kept.clone());

    let options = ApplyOptions {
        dry_run: args.dry_run,
        backup: args.backup,
        verify: args.verify,
        auto_rollback: args.auto_rollback,
        check_metrics: config.verify.check_metrics,
        exclude: config.scan_exclude.clone(),
        verify_options: config.verify_options(args.verify_cmd.clone(), args.verify_timeout),
    };
    let report = apply_and_verify(&root, &kept_plan, &options);

    // Rejections stick even on a dry run; approvals need a real apply
    if args.session.is_some() || !args.reject.is_empty() {
        let session_id = args.session.as_deref().unwrap_or(DEFAULT_SESSION);
        let approved = if args.dry_run {
            Vec::new()
        } else {
            kept_plan.operations.iter().map(|op| op.operation_key()).collect()
        };
        session
            .record_keys(session_id, approved, args.reject.clone())
            .context("Failed to save session memory")?;
    }
    if !args.dry_run {
        let record = record_from_report(&kept_plan, &report, risks);
        if let Err(e) = LearningStore::for_project(&root).append(&record) {
            warn!("Failed to append learning record: {}", e);
        }
        if report.verify.failed() {
            session
                .record_verify_failure(&kept_plan.operations)
                .context("Failed to save session memory")?;
        }
    }

    if args.json {
        let output = ApplyOutput {
            mode: config.policy.mode,
            policy: &outcome,
            report: &report,
        };
        let content =
            serde_json::to_string_pretty(&output).context("Failed to serialize apply report")?;
        println!("{}", content);
    } else {
        print_outcome(config.policy.mode, &outcome, &report);
    }

    if report.verify.failed() {
        bail!(
            "Verification failed (returncode {})",
            report
                .verify
                .returncode
                .map_or_else(|| "none".to_string(), |c| c.to_string())
        );
    }
    Ok(())
}

fn decision_label(decision: PolicyDecision) -> String {
    match decision {
        PolicyDecision::Allow => style("allow").green().to_string(),
        PolicyDecision::Review => style("review").yellow().to_string(),
        PolicyDecision::Deny => style("deny").red().to_string(),
    }
}

fn print_outcome(mode: PolicyMode, outcome: &RuntimePolicyOutcome, report: &ApplyReport) {
    println!("\narchfix apply ({} mode)\n", style(mode).cyan());

    if !outcome.decisions.is_empty() {
        println!("  Policy decisions:");
        for record in &outcome.decisions {
            println!(
                "    [{}] {:<8} {} {} ({}, {})",
                record.index,
                decision_label(record.decision),
                record.kind,
                style(&record.target_file).cyan(),
                record.risk,
                style(&record.reason).dim()
            );
        }
    }
    let summary = outcome.decision_summary;
    println!(
        "  Kept {} of {} operations ({} blocked by policy, {} skipped by campaign memory)",
        style(outcome.kept.len()).cyan(),
        outcome.decisions.len() + outcome.skipped.len(),
        summary.blocked_by_policy,
        summary.blocked_by_human
    );
    println!();

    let verb = if report.dry_run { "Would modify" } else { "Modified" };
    for file in &report.modified {
        println!("  {} {} {}", style("[OK]").green(), verb, file);
    }
    for file in &report.skipped {
        println!("  {} Skipped {}", style("[--]").dim(), file);
    }
    for error in &report.errors {
        println!("  {} {}", style("[ERR]").red(), error);
    }
    if let Some(dir) = &report.backup_dir {
        println!("  Backup: {}", style(dir).dim());
    }

    match report.verify.success {
        Some(true) => println!(
            "  {} Verify passed in {} ms{}",
            style("[OK]").green(),
            report.verify_duration_ms,
            if report.verify.py_compile_fallback {
                " (py_compile fallback)"
            } else {
                ""
            }
        ),
        Some(false) => {
            println!(
                "  {} Verify failed: {}",
                style("[FAIL]").red(),
                report.verify.command.join(" ")
            );
            let tail = report.verify.stderr.trim();
            if !tail.is_empty() {
                println!("{}", style(tail).dim());
            }
            if let Some(guidance) = &report.verify.guidance {
                println!("  Hint: {}", guidance);
            }
        }
        None => println!("  {} Verify not run", style("[--]").dim()),
    }

    if let Some(metrics) = &report.metrics {
        println!(
            "  Health: {} -> {} ({:+})",
            metrics.before, metrics.after, metrics.delta
        );
    }

    if let Some(rollback) = &report.rollback {
        if report.state == ApplyState::RolledBack {
            println!(
                "  {} Rolled back run {} ({} restored, {} removed)",
                style("[ROLLBACK]").yellow(),
                rollback.run_id.as_deref().unwrap_or("-"),
                rollback.restored.len(),
                rollback.removed.len()
            );
        } else {
            println!(
                "  {} Rollback not done: {}",
                style("[ROLLBACK]").red(),
                rollback.reason.as_deref().unwrap_or("unknown")
            );
        }
        for error in &rollback.errors {
            println!("    {} {}", style("[ERR]").red(), error);
        }
    }
}
