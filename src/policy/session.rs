//! Campaign memory across apply runs (`.archfix/session_memory.json`)
//!
//! Remembers which operation keys a human rejected and which ones failed
//! verification, so repeat offenders can be gated on the next run.

use crate::error::{ArchError, ArchResult};
use crate::learning::STATE_DIR;
use crate::models::PatchOperation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const SESSION_FILE: &str = "session_memory.json";

const MAX_REJECTED_KEYS: usize = 100;
const MAX_VERIFY_FAIL_RUNS: usize = 20;

/// Failures needed before a key is skipped outright
pub const REPEATED_FAILURE_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    #[serde(default)]
    pub approved_keys: Vec<String>,
    #[serde(default)]
    pub rejected_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(default)]
    pub rejected_keys: Vec<String>,
    /// One entry per failed run, oldest first
    #[serde(default)]
    pub verify_fail_runs: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    sessions: BTreeMap<String, SessionEntry>,
    #[serde(default)]
    campaign: Campaign,
}

#[derive(Debug, Clone)]
pub struct SessionMemory {
    path: PathBuf,
    data: SessionFile,
}

impl SessionMemory {
    /// Load the memory for a project; a corrupt file starts fresh
    pub fn load(root: &Path) -> Self {
        let path = root.join(STATE_DIR).join(SESSION_FILE);
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Resetting unreadable session memory {}: {}", path.display(), e);
                SessionFile::default()
            }),
            Err(_) => SessionFile::default(),
        };
        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn campaign(&self) -> &Campaign {
        &self.data.campaign
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionEntry> {
        self.data.sessions.get(session_id)
    }

    fn save(&self) -> ArchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| ArchError::Config(format!("session memory: {}", e)))?;
        std::fs::write(&self.path, json).map_err(|e| ArchError::io(&self.path, e))
    }

    /// Record human decisions for a session; rejections also enter the campaign
    pub fn record(
        &mut self,
        session_id: &str,
        approved: &[PatchOperation],
        rejected: &[PatchOperation],
    ) -> ArchResult<()> {
        let approved: Vec<String> = approved.iter().map(|op| op.operation_key()).collect();
        let rejected: Vec<String> = rejected.iter().map(|op| op.operation_key()).collect();
        self.record_keys(session_id, approved, rejected)
    }

    pub fn record_keys(
        &mut self,
        session_id: &str,
        approved: Vec<String>,
        rejected: Vec<String>,
    ) -> ArchResult<()> {
        let campaign = &mut self.data.campaign;
        let merged: BTreeSet<String> = campaign
            .rejected_keys
            .drain(..)
            .chain(rejected.iter().cloned())
            .collect();
        let merged: Vec<String> = merged.into_iter().collect();
        let skip = merged.len().saturating_sub(MAX_REJECTED_KEYS);
        campaign.rejected_keys = merged.into_iter().skip(skip).collect();

        self.data.sessions.insert(
            session_id.to_string(),
            SessionEntry {
                approved_keys: approved,
                rejected_keys: rejected,
            },
        );
        self.save()
    }

    /// Remember the operations of a run that failed verification
    pub fn record_verify_failure(&mut self, operations: &[PatchOperation]) -> ArchResult<()> {
        let keys: Vec<String> = operations
            .iter()
            .map(|op| op.operation_key())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Ok(());
        }
        debug!("Recording {} verify-failure keys", keys.len());
        let runs = &mut self.data.campaign.verify_fail_runs;
        runs.push(keys);
        if runs.len() > MAX_VERIFY_FAIL_RUNS {
            let excess = runs.len() - MAX_VERIFY_FAIL_RUNS;
            runs.drain(..excess);
        }
        self.save()
    }

    /// Verify failures per operation key across remembered runs
    pub fn failure_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for run in &self.data.campaign.verify_fail_runs {
            for key in run {
                *counts.entry(key.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn rejected_keys(&self) -> BTreeSet<String> {
        self.data.campaign.rejected_keys.iter().cloned().collect()
    }

    /// Rejected keys plus keys that failed verification repeatedly
    pub fn campaign_keys_to_skip(&self) -> BTreeSet<String> {
        let mut keys = self.rejected_keys();
        keys.extend(
            self.failure_counts()
                .into_iter()
                .filter(|(_, n)| *n >= REPEATED_FAILURE_THRESHOLD)
                .map(|(k, _)| k),
        );
        keys
    }
}
