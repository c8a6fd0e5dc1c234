//! Learning store
//!
//! Every apply run appends one [`LearningRecord`] to
//! `.archfix/learning.jsonl`. Aggregations over those records feed back
//! into planning (success-rate filtering and ordering) and into the policy
//! gate (deny candidates per target).

use crate::apply::ApplyReport;
use crate::error::{ArchError, ArchResult};
use crate::models::{ActionKind, PatchPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory holding archfix state inside a project
pub const STATE_DIR: &str = ".archfix";
pub const LEARNING_FILE: &str = "learning.jsonl";

const DENY_MIN_TOTAL: usize = 3;
const DENY_MAX_RATE: f64 = 0.25;
const WHITELIST_MIN_TOTAL: usize = 2;
const WHITELIST_MIN_RATE: f64 = 0.6;

/// What happened to one operation in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    NotApplied,
    VerifySuccess,
    VerifyFail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningOperation {
    pub target_file: String,
    pub kind: ActionKind,
    #[serde(default)]
    pub smell_type: Option<String>,
    #[serde(default)]
    pub execution_outcome: Option<ExecutionOutcome>,
}

impl LearningOperation {
    fn smell(&self) -> &str {
        self.smell_type.as_deref().unwrap_or("unknown")
    }

    /// Explicit outcome, else derived from the run's verify result
    pub fn resolve_outcome(&self, verify_success: Option<bool>) -> ExecutionOutcome {
        if let Some(outcome) = self.execution_outcome {
            return outcome;
        }
        match verify_success {
            Some(true) => ExecutionOutcome::VerifySuccess,
            Some(false) => ExecutionOutcome::VerifyFail,
            None => ExecutionOutcome::NotApplied,
        }
    }
}

/// One apply run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub project_root: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub operations: Vec<LearningOperation>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub verify_success: Option<bool>,
}

impl LearningRecord {
    pub fn new(
        project_root: impl Into<String>,
        modules: Vec<String>,
        operations: Vec<LearningOperation>,
        risks: Vec<String>,
        verify_success: Option<bool>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            project_root: project_root.into(),
            modules,
            operations,
            risks,
            verify_success,
        }
    }
}

/// Build the record for a finished apply run
///
/// Modified targets take their outcome from verification; everything else
/// in the plan counts as not applied.
pub fn record_from_report(plan: &PatchPlan, report: &ApplyReport, risks: Vec<String>) -> LearningRecord {
    let verify_success = report.verify.success;
    let operations = plan
        .operations
        .iter()
        .map(|op| {
            let applied = report.modified.contains(&op.target_file);
            let execution_outcome = if !applied {
                Some(ExecutionOutcome::NotApplied)
            } else {
                match verify_success {
                    Some(true) => Some(ExecutionOutcome::VerifySuccess),
                    Some(false) => Some(ExecutionOutcome::VerifyFail),
                    None => None,
                }
            };
            LearningOperation {
                target_file: op.target_file.clone(),
                kind: op.kind,
                smell_type: op.smell_type.clone(),
                execution_outcome,
            }
        })
        .collect();
    let mut modules: Vec<String> = Vec::new();
    for op in &plan.operations {
        if !modules.contains(&op.target_file) {
            modules.push(op.target_file.clone());
        }
    }
    LearningRecord::new(
        plan.project_root.clone(),
        modules,
        operations,
        risks,
        verify_success,
    )
}

/// Outcome counters for one aggregation key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeStats {
    pub total: usize,
    pub success: usize,
    pub fail: usize,
    pub verify_success: usize,
    pub verify_fail: usize,
    pub not_applied: usize,
}

impl OutcomeStats {
    fn record(&mut self, outcome: ExecutionOutcome) {
        self.total += 1;
        match outcome {
            ExecutionOutcome::VerifySuccess => {
                self.verify_success += 1;
                self.success += 1;
            }
            ExecutionOutcome::VerifyFail => {
                self.verify_fail += 1;
                self.fail += 1;
            }
            ExecutionOutcome::NotApplied => self.not_applied += 1,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }
}

/// `smell|kind` (or `kind`) -> counters
pub type LearningStats = BTreeMap<String, OutcomeStats>;

/// Counters for one (smell, action, target) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStats {
    pub smell_type: String,
    pub action_kind: String,
    pub target_file: String,
    pub total: usize,
    pub verify_success: usize,
    pub verify_fail: usize,
    pub not_applied: usize,
    pub verify_success_rate: f64,
}

pub fn aggregate_by_smell_action(records: &[LearningRecord]) -> LearningStats {
    let mut stats = LearningStats::new();
    for record in records {
        for op in &record.operations {
            let key = format!("{}|{}", op.smell(), op.kind);
            stats
                .entry(key)
                .or_default()
                .record(op.resolve_outcome(record.verify_success));
        }
    }
    stats
}

pub fn aggregate_by_action_kind(records: &[LearningRecord]) -> LearningStats {
    let mut stats = LearningStats::new();
    for record in records {
        for op in &record.operations {
            stats
                .entry(op.kind.to_string())
                .or_default()
                .record(op.resolve_outcome(record.verify_success));
        }
    }
    stats
}

/// Per-target counters, best verify rate first
pub fn aggregate_by_target(records: &[LearningRecord]) -> Vec<TargetStats> {
    let mut by_target: BTreeMap<(String, String, String), OutcomeStats> = BTreeMap::new();
    for record in records {
        for op in record.operations.iter().filter(|o| !o.target_file.is_empty()) {
            by_target
                .entry((
                    op.smell().to_string(),
                    op.kind.to_string(),
                    op.target_file.clone(),
                ))
                .or_default()
                .record(op.resolve_outcome(record.verify_success));
        }
    }
    let mut targets: Vec<TargetStats> = by_target
        .into_iter()
        .map(|((smell_type, action_kind, target_file), s)| TargetStats {
            smell_type,
            action_kind,
            target_file,
            total: s.total,
            verify_success: s.verify_success,
            verify_fail: s.verify_fail,
            not_applied: s.not_applied,
            verify_success_rate: s.verify_success as f64 / s.total.max(1) as f64,
        })
        .collect();
    targets.sort_by(|a, b| {
        b.verify_success_rate
            .total_cmp(&a.verify_success_rate)
            .then_with(|| b.verify_success.cmp(&a.verify_success))
            .then_with(|| a.verify_fail.cmp(&b.verify_fail))
    });
    targets
}

/// Targets that keep failing verification
pub fn deny_candidates(records: &[LearningRecord], top_n: usize) -> Vec<TargetStats> {
    aggregate_by_target(records)
        .into_iter()
        .filter(|t| t.total >= DENY_MIN_TOTAL && t.verify_success_rate < DENY_MAX_RATE)
        .take(top_n)
        .collect()
}

/// Targets that reliably pass verification
pub fn whitelist_candidates(records: &[LearningRecord], top_n: usize) -> Vec<TargetStats> {
    aggregate_by_target(records)
        .into_iter()
        .filter(|t| t.total >= WHITELIST_MIN_TOTAL && t.verify_success_rate >= WHITELIST_MIN_RATE)
        .take(top_n)
        .collect()
}

/// Append-only JSONL store
pub struct LearningStore {
    path: PathBuf,
}

impl LearningStore {
    /// Store at `<root>/.archfix/learning.jsonl`
    pub fn for_project(root: &Path) -> Self {
        Self::with_path(root.join(STATE_DIR).join(LEARNING_FILE))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &LearningRecord) -> ArchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        let json = serde_json::to_string(record)
            .map_err(|e| ArchError::Config(format!("learning record: {}", e)))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArchError::io(&self.path, e))?;
        writeln!(file, "{}", json).map_err(|e| ArchError::io(&self.path, e))?;
        debug!("Appended learning record {}", record.id);
        Ok(())
    }

    /// All readable records; corrupt lines are skipped
    pub fn load_all(&self) -> ArchResult<Vec<LearningRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(|e| ArchError::io(&self.path, e))?;
        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ArchError::io(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LearningRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Skipping corrupt learning line {} in {}: {}",
                    lineno + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(records)
    }

    pub fn aggregate_by_smell_action(&self) -> ArchResult<LearningStats> {
        Ok(aggregate_by_smell_action(&self.load_all()?))
    }

    pub fn aggregate_by_action_kind(&self) -> ArchResult<LearningStats> {
        Ok(aggregate_by_action_kind(&self.load_all()?))
    }

    pub fn deny_candidates(&self, top_n: usize) -> ArchResult<Vec<TargetStats>> {
        Ok(deny_candidates(&self.load_all()?, top_n))
    }

    pub fn whitelist_candidates(&self, top_n: usize) -> ArchResult<Vec<TargetStats>> {
        Ok(whitelist_candidates(&self.load_all()?, top_n))
    }
}
