//! `archfix.toml` at the project root
//!
//! Every section is optional. Unknown keys are ignored so older binaries
//! can read newer files.

use crate::error::{ArchError, ArchResult};
use crate::planner::PlannerConfig;
use crate::policy::PolicySection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "archfix.toml";

/// `[verify]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySection {
    /// Shell-style command line run after applying a plan
    pub command: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Interpreter used for the pytest and py_compile fallbacks
    pub python: Option<String>,
    /// Roll back when the health score drops after a passing verify
    pub check_metrics: bool,
}

/// `[scan]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Directory names skipped in addition to the built-in list
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub policy: PolicySection,
    pub planner: PlannerConfig,
    pub verify: VerifySection,
    pub scan: ScanSection,
}

pub fn parse_project_config(content: &str) -> ArchResult<ProjectConfig> {
    toml::from_str(content).map_err(|e| ArchError::Config(e.to_string()))
}

/// Load `archfix.toml`, falling back to defaults when missing or invalid
pub fn load_project_config(root: &Path) -> ProjectConfig {
    let path = root.join(CONFIG_FILE);
    let Ok(content) = std::fs::read_to_string(&path) else {
        debug!("No project config found, using defaults");
        return ProjectConfig::default();
    };
    match parse_project_config(&content) {
        Ok(config) => {
            debug!("Loaded project config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {}", path.display(), e);
            ProjectConfig::default()
        }
    }
}
