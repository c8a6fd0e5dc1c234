//! Rollback and backups commands

use super::project_root;
use crate::apply::{list_backups, restore_backup, BACKUP_DIR};
use anyhow::{bail, Context, Result};
use console::style;
use std::path::Path;

/// Restore a backup run (latest when `run_id` is `None`)
pub fn run(path: &Path, run_id: Option<&str>, json: bool) -> Result<()> {
    let root = project_root(path)?;
    let report = restore_backup(&root, run_id);

    if json {
        let content =
            serde_json::to_string_pretty(&report).context("Failed to serialize restore report")?;
        println!("{}", content);
    } else {
        if let Some(id) = &report.run_id {
            println!("\nRestoring run {}\n", style(id).cyan());
        }
        for file in &report.restored {
            println!("  {} Restored {}", style("[OK]").green(), file);
        }
        for file in &report.removed {
            println!("  {} Removed {}", style("[OK]").green(), file);
        }
        for error in &report.errors {
            println!("  {} {}", style("[ERR]").red(), error);
        }
    }

    if !report.errors.is_empty() {
        bail!("Rollback finished with {} errors", report.errors.len());
    }
    Ok(())
}

/// List backup runs, oldest first
pub fn list(path: &Path) -> Result<()> {
    let root = project_root(path)?;
    let runs = list_backups(&root);
    if runs.is_empty() {
        println!(
            "  {} No backups under {}",
            style("[--]").dim(),
            root.join(BACKUP_DIR).display()
        );
        return Ok(());
    }
    println!("\nBackup runs ({}):\n", runs.len());
    let latest = runs.len() - 1;
    for (i, run_id) in runs.iter().enumerate() {
        if i == latest {
            println!("  {} {}", style(run_id).cyan(), style("(latest)").dim());
        } else {
            println!("  {}", run_id);
        }
    }
    println!(
        "\n  Restore with: {}",
        style("archfix rollback . --run-id <RUN_ID>").cyan()
    );
    Ok(())
}
