//! Per-run file backups under `.archfix_backups/<run_id>/`
//!
//! A file is copied the first time a run mutates it. Files a run creates
//! are listed in `<run_id>.created` next to the run directory so rollback
//! can remove them again.

use crate::error::{ArchError, ArchResult};
use crate::graph::scanner::relative_path;
use chrono::Utc;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const BACKUP_DIR: &str = ".archfix_backups";
const CREATED_SUFFIX: &str = ".created";

/// Timestamped run id; sorts chronologically
pub fn new_run_id() -> String {
    Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

fn created_manifest(backup_root: &Path, run_id: &str) -> PathBuf {
    backup_root.join(format!("{}{}", run_id, CREATED_SUFFIX))
}

/// Backup state for one apply run
#[derive(Debug)]
pub struct BackupRun {
    root: PathBuf,
    run_id: String,
    enabled: bool,
    backed_up: BTreeSet<String>,
    created: Vec<String>,
}

impl BackupRun {
    pub fn new(root: &Path, enabled: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            run_id: new_run_id(),
            enabled,
            backed_up: BTreeSet::new(),
            created: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR).join(&self.run_id)
    }

    /// Whether anything was saved for this run
    pub fn is_used(&self) -> bool {
        self.enabled && (!self.backed_up.is_empty() || !self.created.is_empty())
    }

    /// Copy `target_file` into the run directory before its first mutation
    pub fn backup_file(&mut self, target_file: &str) -> ArchResult<()> {
        if !self.enabled || self.backed_up.contains(target_file) {
            return Ok(());
        }
        let source = self.root.join(target_file);
        let dest = self.dir().join(target_file);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        std::fs::copy(&source, &dest).map_err(|e| ArchError::io(&source, e))?;
        debug!("Backed up {} to {}", target_file, dest.display());
        self.backed_up.insert(target_file.to_string());
        Ok(())
    }

    /// Remember a file this run created so rollback can delete it
    pub fn record_created(&mut self, rel_path: &str) -> ArchResult<()> {
        if !self.enabled {
            return Ok(());
        }
        self.created.push(rel_path.to_string());
        let dir = self.dir();
        std::fs::create_dir_all(&dir).map_err(|e| ArchError::io(&dir, e))?;
        let manifest = created_manifest(&self.root.join(BACKUP_DIR), &self.run_id);
        std::fs::write(&manifest, self.created.join("\n"))
            .map_err(|e| ArchError::io(&manifest, e))
    }
}

/// Outcome of restoring one backup run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub run_id: Option<String>,
    pub restored: Vec<String>,
    /// Files created by the run and deleted again
    #[serde(default)]
    pub removed: Vec<String>,
    pub errors: Vec<String>,
}

/// Sorted run ids under `.archfix_backups/`
pub fn list_backups(root: &Path) -> Vec<String> {
    let backup_root = root.join(BACKUP_DIR);
    let Ok(entries) = std::fs::read_dir(&backup_root) else {
        return Vec::new();
    };
    let mut run_ids: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    run_ids.sort();
    run_ids
}

/// Restore a backup run; `None` picks the latest
///
/// Never fails: missing directories and per-file I/O problems are
/// collected in the report.
pub fn restore_backup(root: &Path, run_id: Option<&str>) -> RestoreReport {
    let backup_root = root.join(BACKUP_DIR);
    let mut report = RestoreReport::default();
    if !backup_root.is_dir() {
        report
            .errors
            .push(format!("Backup dir not found: {}", backup_root.display()));
        return report;
    }
    let run_id = match run_id {
        Some(id) => id.to_string(),
        None => match list_backups(root).pop() {
            Some(id) => id,
            None => {
                report.errors.push("No backup runs found".to_string());
                return report;
            }
        },
    };
    report.run_id = Some(run_id.clone());
    let run_dir = backup_root.join(&run_id);
    if !run_dir.is_dir() {
        report.errors.push(format!("Run not found: {}", run_id));
        return report;
    }

    let walker = WalkBuilder::new(&run_dir).standard_filters(false).build();
    let mut files: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    for backup in files {
        let rel = relative_path(&run_dir, &backup);
        let target = root.join(&rel);
        let result = target
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::copy(&backup, &target).map(|_| ()));
        match result {
            Ok(()) => report.restored.push(rel),
            Err(e) => report.errors.push(format!("{}: {}", rel, e)),
        }
    }

    if let Ok(manifest) = std::fs::read_to_string(created_manifest(&backup_root, &run_id)) {
        for rel in manifest.lines().filter(|l| !l.trim().is_empty()) {
            let path = root.join(rel);
            if !path.exists() {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => report.removed.push(rel.to_string()),
                Err(e) => report.errors.push(format!("{}: {}", rel, e)),
            }
        }
    }

    if report.errors.is_empty() {
        info!("Restored {} files from run {}", report.restored.len(), run_id);
    } else {
        warn!("Restore of run {} finished with {} errors", run_id, report.errors.len());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_once_and_restore() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/a.py"), "original\n").unwrap();

        let mut run = BackupRun::new(dir.path(), true);
        run.backup_file("pkg/a.py").unwrap();
        std::fs::write(dir.path().join("pkg/a.py"), "first\n").unwrap();
        // a second backup keeps the pristine copy
        run.backup_file("pkg/a.py").unwrap();
        std::fs::write(dir.path().join("pkg/a.py"), "second\n").unwrap();
        std::fs::write(dir.path().join("pkg/new.py"), "created\n").unwrap();
        run.record_created("pkg/new.py").unwrap();
        assert!(run.is_used());

        let report = restore_backup(dir.path(), Some(run.run_id()));
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.restored, vec!["pkg/a.py".to_string()]);
        assert_eq!(report.removed, vec!["pkg/new.py".to_string()]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pkg/a.py")).unwrap(),
            "original\n"
        );
        assert!(!dir.path().join("pkg/new.py").exists());
    }

    #[test]
    fn test_disabled_backup_is_noop() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x\n").unwrap();
        let mut run = BackupRun::new(dir.path(), false);
        run.backup_file("a.py").unwrap();
        assert!(!run.is_used());
        assert!(!dir.path().join(BACKUP_DIR).exists());
    }

    #[test]
    fn test_restore_errors_are_reported() {
        let dir = TempDir::new().unwrap();
        let missing_root = restore_backup(dir.path(), None);
        assert_eq!(missing_root.errors.len(), 1);
        assert!(missing_root.errors[0].starts_with("Backup dir not found"));

        std::fs::create_dir_all(dir.path().join(BACKUP_DIR)).unwrap();
        assert_eq!(
            restore_backup(dir.path(), None).errors,
            vec!["No backup runs found".to_string()]
        );
        assert_eq!(
            restore_backup(dir.path(), Some("nope")).errors,
            vec!["Run not found: nope".to_string()]
        );
    }

    #[test]
    fn test_list_backups_sorted() {
        let dir = TempDir::new().unwrap();
        for id in ["20240102_000000_000", "20240101_000000_000"] {
            std::fs::create_dir_all(dir.path().join(BACKUP_DIR).join(id)).unwrap();
        }
        std::fs::write(dir.path().join(BACKUP_DIR).join("x.created"), "").unwrap();
        assert_eq!(
            list_backups(dir.path()),
            vec!["20240101_000000_000".to_string(), "20240102_000000_000".to_string()]
        );
    }
}
