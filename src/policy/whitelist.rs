//! Operation whitelist (`.archfix/operation_whitelist.json`)
//!
//! Entries name concrete operations that have proven safe and may be
//! relaxed by the policy gate. A missing or unreadable file is an empty
//! whitelist.

use crate::error::{ArchError, ArchResult};
use crate::learning::{TargetStats, STATE_DIR};
use crate::models::{ActionKind, PatchOperation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const WHITELIST_FILE: &str = "operation_whitelist.json";

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub kind: ActionKind,
    pub target_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smell_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub allow_in_hybrid: bool,
    #[serde(default)]
    pub allow_in_auto: bool,
}

impl WhitelistEntry {
    pub fn matches(&self, op: &PatchOperation) -> bool {
        if self.kind != op.kind || self.target_file != op.target_file {
            return false;
        }
        if let Some(smell) = &self.smell_type {
            if op.smell_type.as_deref() != Some(smell.as_str()) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if op.location() != Some(location.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whitelist {
    #[serde(default)]
    pub operations: Vec<WhitelistEntry>,
}

impl Whitelist {
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(WHITELIST_FILE)
    }

    /// Load the project whitelist; parse failures are logged and ignored
    pub fn load(root: &Path) -> Self {
        let path = Self::path_for(root);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(whitelist) => whitelist,
            Err(e) => {
                warn!("Ignoring malformed whitelist {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> ArchResult<PathBuf> {
        let path = Self::path_for(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ArchError::Config(format!("whitelist serialization: {}", e)))?;
        std::fs::write(&path, json).map_err(|e| ArchError::io(&path, e))?;
        Ok(path)
    }

    pub fn find(&self, op: &PatchOperation) -> Option<&WhitelistEntry> {
        self.operations.iter().find(|entry| entry.matches(op))
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Draft entries from learning targets with a good verify record
    ///
    /// Candidates whose action kind does not parse are skipped. Drafted
    /// entries only relax hybrid mode unless `allow_in_auto` is set.
    pub fn draft_from_candidates(candidates: &[TargetStats], allow_in_auto: bool) -> Self {
        let operations = candidates
            .iter()
            .filter_map(|c| {
                let kind = c.action_kind.parse::<ActionKind>().ok()?;
                Some(WhitelistEntry {
                    kind,
                    target_file: c.target_file.clone(),
                    smell_type: (c.smell_type != "unknown").then(|| c.smell_type.clone()),
                    location: None,
                    allow_in_hybrid: true,
                    allow_in_auto,
                })
            })
            .collect();
        Self { operations }
    }
}
