//! Apply, verify and roll back patch plans
//!
//! ```text
//! Applying ─► Verifying ─► Done
//!                 │
//!                 └─► RollingBack ─► RolledBack
//! ```
//!
//! Nothing here returns an error to the caller. Per-operation I/O problems,
//! verify failures and rollback errors are all recorded in [`ApplyReport`].

pub mod backup;
pub mod verify;

pub use backup::{list_backups, restore_backup, BackupRun, RestoreReport, BACKUP_DIR};
pub use verify::{verify_patch, VerifyOptions, VerifyReport};

use crate::detectors::detect_smells;
use crate::error::{ArchError, ArchResult};
use crate::graph::{scan_project, ProjectGraph};
use crate::history::Trends;
use crate::models::{ActionKind, PatchOperation, PatchPlan};
use crate::planner::learning::refactor_marker;
use crate::python::{
    extract_class, introduce_facade, remove_import, remove_unused_imports, split_module,
};
use crate::scoring::compute_health;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Applying,
    Verifying,
    Done,
    RollingBack,
    RolledBack,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub restored: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Health score around an apply run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub before: i32,
    pub after: i32,
    pub delta: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub modified: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<String>,
    pub backup_dir: Option<String>,
    pub run_id: Option<String>,
    pub dry_run: bool,
    pub state: ApplyState,
    pub verify: VerifyReport,
    pub verify_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsRecord>,
}

impl ApplyReport {
    fn new(dry_run: bool) -> Self {
        Self {
            modified: Vec::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
            backup_dir: None,
            run_id: None,
            dry_run,
            state: ApplyState::Applying,
            verify: VerifyReport::not_run(),
            verify_duration_ms: 0,
            rollback: None,
            metrics: None,
        }
    }

    pub fn rolled_back(&self) -> bool {
        self.rollback.as_ref().is_some_and(|r| r.done)
    }

    fn mark_modified(&mut self, file: &str) {
        if !self.modified.iter().any(|m| m == file) {
            self.modified.push(file.to_string());
        }
    }
}

/// Knobs for [`apply_and_verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub dry_run: bool,
    pub backup: bool,
    pub verify: bool,
    pub auto_rollback: bool,
    /// Roll back when the health score drops after a passing verify
    pub check_metrics: bool,
    /// Scanner excludes used for the health comparison
    pub exclude: Vec<String>,
    pub verify_options: VerifyOptions,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
            verify: true,
            auto_rollback: true,
            check_metrics: false,
            exclude: Vec::new(),
            verify_options: VerifyOptions::default(),
        }
    }
}

enum OpOutcome {
    Modified(Vec<String>),
    Skipped(&'static str),
}

fn write_file(root: &Path, rel: &str, content: &str, run: &mut BackupRun) -> ArchResult<()> {
    run.backup_file(rel)?;
    let path = root.join(rel);
    std::fs::write(&path, content).map_err(|e| ArchError::io(&path, e))
}

/// Write a file that did not exist before and register it for rollback
fn create_file(root: &Path, rel: &str, content: &str, run: &mut BackupRun) -> ArchResult<()> {
    run.record_created(rel)?;
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
    }
    std::fs::write(&path, content).map_err(|e| ArchError::io(&path, e))
}

fn rewrite(
    root: &Path,
    op: &PatchOperation,
    content: &str,
    updated: Option<String>,
    run: &mut BackupRun,
    reason: &'static str,
) -> ArchResult<OpOutcome> {
    match updated {
        Some(new) if new != content => {
            write_file(root, &op.target_file, &new, run)?;
            Ok(OpOutcome::Modified(vec![op.target_file.clone()]))
        }
        _ => Ok(OpOutcome::Skipped(reason)),
    }
}

fn apply_extract_class(
    root: &Path,
    op: &PatchOperation,
    content: &str,
    run: &mut BackupRun,
) -> ArchResult<Option<OpOutcome>> {
    let Some(params) = op.params.as_ref() else {
        return Ok(None);
    };
    let (Some(class), Some(methods)) = (&params.target_class, &params.methods_to_extract) else {
        return Ok(None);
    };
    let Some(extracted) = extract_class(content, &op.target_file, class, methods) else {
        return Ok(Some(OpOutcome::Skipped("nothing extractable")));
    };
    if root.join(&extracted.new_rel_path).exists() {
        return Ok(Some(OpOutcome::Skipped("extracted module already exists")));
    }
    run.backup_file(&op.target_file)?;
    create_file(root, &extracted.new_rel_path, &extracted.new_content, run)?;
    write_file(root, &op.target_file, &extracted.modified_original, run)?;
    info!(
        "Extracted {} methods of {} into {}",
        extracted.extracted.len(),
        extracted.class_name,
        extracted.new_rel_path
    );
    Ok(Some(OpOutcome::Modified(vec![
        op.target_file.clone(),
        extracted.new_rel_path,
    ])))
}

/// Move definitions into a sibling module: by import, then class, then function
fn apply_split(
    root: &Path,
    op: &PatchOperation,
    content: &str,
    run: &mut BackupRun,
) -> ArchResult<Option<OpOutcome>> {
    let imports_from = op
        .params
        .as_ref()
        .and_then(|p| p.imports_from.as_deref())
        .unwrap_or(&[]);
    let Some(split) = split_module(content, &op.target_file, imports_from) else {
        return Ok(None);
    };
    if root.join(&split.new_rel_path).exists() {
        return Ok(Some(OpOutcome::Skipped("extracted module already exists")));
    }
    run.backup_file(&op.target_file)?;
    create_file(root, &split.new_rel_path, &split.new_content, run)?;
    write_file(root, &op.target_file, &split.modified_original, run)?;
    info!(
        "Split {} {}: moved {} into {}",
        op.target_file,
        split.strategy.as_str(),
        split.moved.join(", "),
        split.new_rel_path
    );
    Ok(Some(OpOutcome::Modified(vec![
        op.target_file.clone(),
        split.new_rel_path,
    ])))
}

fn apply_facade(
    root: &Path,
    op: &PatchOperation,
    content: &str,
    run: &mut BackupRun,
) -> ArchResult<OpOutcome> {
    let callers = op
        .params
        .as_ref()
        .and_then(|p| p.callers.as_deref())
        .unwrap_or(&[]);
    let Some(facade) = introduce_facade(content, &op.target_file, callers) else {
        return Ok(OpOutcome::Skipped("no public names for a facade"));
    };
    if root.join(&facade.new_rel_path).exists() {
        return Ok(OpOutcome::Skipped("facade already exists"));
    }
    create_file(root, &facade.new_rel_path, &facade.new_content, run)?;
    info!(
        "Created facade {} re-exporting {} names",
        facade.new_rel_path,
        facade.names.len()
    );
    Ok(OpOutcome::Modified(vec![facade.new_rel_path]))
}

/// Write a missing module whose content is the operation's diff
fn create_module_stub(
    root: &Path,
    op: &PatchOperation,
    dry_run: bool,
    run: &mut BackupRun,
) -> ArchResult<OpOutcome> {
    if root.join(&op.target_file).exists() {
        return Ok(OpOutcome::Skipped("module already exists"));
    }
    let stub = op.diff.trim_end();
    if stub.trim().is_empty() {
        return Ok(OpOutcome::Skipped("empty diff"));
    }
    if !dry_run {
        create_file(root, &op.target_file, &format!("{}\n", stub), run)?;
    }
    Ok(OpOutcome::Modified(vec![op.target_file.clone()]))
}

fn append_diff(
    root: &Path,
    op: &PatchOperation,
    content: &str,
    run: &mut BackupRun,
) -> ArchResult<OpOutcome> {
    let diff = op.diff.trim();
    if diff.is_empty() {
        return Ok(OpOutcome::Skipped("empty diff"));
    }
    if content.contains(diff) || content.contains(&refactor_marker(&op.target_file)) {
        return Ok(OpOutcome::Skipped("already applied"));
    }
    let updated = format!("{}\n\n{}\n", content.trim_end(), diff);
    write_file(root, &op.target_file, &updated, run)?;
    Ok(OpOutcome::Modified(vec![op.target_file.clone()]))
}

fn apply_operation(root: &Path, op: &PatchOperation, run: &mut BackupRun) -> ArchResult<OpOutcome> {
    let path = root.join(&op.target_file);
    let content = std::fs::read_to_string(&path).map_err(|e| ArchError::io(&path, e))?;
    let target_module = op.params.as_ref().and_then(|p| p.target_module.as_deref());
    match (op.kind, target_module) {
        (ActionKind::RemoveCyclicImport, Some(module)) => rewrite(
            root,
            op,
            &content,
            remove_import(&content, module),
            run,
            "no matching import",
        ),
        (ActionKind::RemoveUnusedImport, _) => rewrite(
            root,
            op,
            &content,
            remove_unused_imports(&content),
            run,
            "no unused imports",
        ),
        // the diff carries the corrected file
        (ActionKind::FixImport, _) if !op.diff.trim().is_empty() => {
            let fixed = format!("{}\n", op.diff.trim_end());
            rewrite(root, op, &content, Some(fixed), run, "already applied")
        }
        (ActionKind::ExtractClass, _) => match apply_extract_class(root, op, &content, run)? {
            Some(outcome) => Ok(outcome),
            None => append_diff(root, op, &content, run),
        },
        (ActionKind::SplitModule | ActionKind::RefactorModule, _) => {
            match apply_split(root, op, &content, run)? {
                Some(outcome) => Ok(outcome),
                None => append_diff(root, op, &content, run),
            }
        }
        (ActionKind::IntroduceFacade, _) => apply_facade(root, op, &content, run),
        _ => append_diff(root, op, &content, run),
    }
}

/// Apply every operation in order, backing files up before first mutation
pub fn apply_patch_plan(root: &Path, plan: &PatchPlan, dry_run: bool, backup: bool) -> ApplyReport {
    let mut report = ApplyReport::new(dry_run);
    let mut run = BackupRun::new(root, backup && !dry_run);

    for op in &plan.operations {
        if op.target_file.trim().is_empty() {
            report.errors.push("operation missing target_file".to_string());
            continue;
        }
        let outcome = if op.kind == ActionKind::CreateModuleStub {
            create_module_stub(root, op, dry_run, &mut run)
        } else if !root.join(&op.target_file).is_file() {
            Ok(OpOutcome::Skipped("not a file"))
        } else if dry_run {
            Ok(OpOutcome::Modified(vec![op.target_file.clone()]))
        } else {
            apply_operation(root, op, &mut run)
        };
        match outcome {
            Ok(OpOutcome::Modified(files)) => {
                debug!("{} applied to {}", op.kind, op.target_file);
                for file in files {
                    report.mark_modified(&file);
                }
            }
            Ok(OpOutcome::Skipped(reason)) => {
                debug!("Skipping {} on {}: {}", op.kind, op.target_file, reason);
                report.skipped.push(op.target_file.clone());
            }
            Err(e) => {
                warn!("Failed to apply {} to {}: {}", op.kind, op.target_file, e);
                report.errors.push(format!("{}: {}", op.target_file, e));
            }
        }
    }

    if run.is_used() {
        report.run_id = Some(run.run_id().to_string());
        report.backup_dir = Some(run.dir().to_string_lossy().into_owned());
    }
    info!(
        "Applied plan: {} modified, {} skipped, {} errors",
        report.modified.len(),
        report.skipped.len(),
        report.errors.len()
    );
    report
}

fn measure_health(root: &Path, exclude: &[String]) -> Option<i32> {
    match scan_project(root, exclude) {
        Ok(self_map) => {
            let graph = ProjectGraph::from_self_map(&self_map);
            let smells = detect_smells(&graph);
            Some(compute_health(&smells, &Trends::insufficient()).score)
        }
        Err(e) => {
            warn!("Health scan failed: {}", e);
            None
        }
    }
}

fn roll_back(root: &Path, report: &mut ApplyReport, trigger: &str, reason: String) {
    report.state = ApplyState::RollingBack;
    let Some(run_id) = report.run_id.clone() else {
        warn!("Cannot roll back: no backup for this run");
        report.rollback = Some(RollbackRecord {
            done: false,
            trigger: Some(trigger.to_string()),
            reason: Some("no run_id (no backup)".to_string()),
            ..Default::default()
        });
        report.state = ApplyState::Done;
        return;
    };
    info!("Rolling back run {} ({})", run_id, reason);
    let restored = restore_backup(root, Some(&run_id));
    report.rollback = Some(RollbackRecord {
        done: true,
        trigger: Some(trigger.to_string()),
        reason: Some(reason),
        run_id: Some(run_id),
        restored: restored.restored,
        removed: restored.removed,
        errors: restored.errors,
    });
    report.state = ApplyState::RolledBack;
}

fn no_tests_collected(verify: &VerifyReport) -> bool {
    verify.returncode == Some(5)
        && format!("{}{}", verify.stdout, verify.stderr)
            .to_lowercase()
            .contains("no tests")
}

/// Apply, verify, and roll back on failure or health regression
pub fn apply_and_verify(root: &Path, plan: &PatchPlan, options: &ApplyOptions) -> ApplyReport {
    let health_before = (options.check_metrics && options.verify && !options.dry_run)
        .then(|| measure_health(root, &options.exclude))
        .flatten();

    let mut report = apply_patch_plan(root, plan, options.dry_run, options.backup);
    if options.dry_run || !options.verify {
        report.state = ApplyState::Done;
        return report;
    }

    report.state = ApplyState::Verifying;
    let started = Instant::now();
    let mut verify = verify_patch(root, &options.verify_options);
    if verify.failed()
        && options.verify_options.command_override.is_none()
        && no_tests_collected(&verify)
        && !report.modified.is_empty()
    {
        info!("No tests collected; falling back to py_compile");
        let fallback = verify::verify_py_compile(root, &report.modified, &options.verify_options);
        if fallback.success == Some(true) {
            verify = fallback;
        }
    }
    report.verify_duration_ms = started.elapsed().as_millis() as u64;
    report.verify = verify;

    if report.verify.failed() {
        if options.auto_rollback {
            let reason = match report.verify.returncode {
                Some(code) => format!("verify failed (returncode {})", code),
                None => "verify failed".to_string(),
            };
            roll_back(root, &mut report, "verify_failed", reason);
        } else {
            report.state = ApplyState::Done;
        }
        return report;
    }

    if let Some(before) = health_before {
        if let Some(after) = measure_health(root, &options.exclude) {
            report.metrics = Some(MetricsRecord {
                before,
                after,
                delta: after - before,
            });
            if after < before {
                roll_back(root, &mut report, "metrics_worsened", "metrics_worsened".to_string());
                return report;
            }
        }
    }
    report.state = ApplyState::Done;
    report
}
