//! Configuration for archfix
//!
//! This module handles:
//! - Project-level configuration (`archfix.toml`)
//! - `ARCHFIX_*` environment overrides, read once at load
//! - Resolution into the explicit structs the pipeline stages take

mod project_config;

pub use project_config::{
    load_project_config, parse_project_config, ProjectConfig, ScanSection, VerifySection,
    CONFIG_FILE,
};

use crate::apply::verify::{DEFAULT_PYTHON, DEFAULT_TIMEOUT_SECS};
use crate::apply::VerifyOptions;
use crate::models::RiskLevel;
use crate::planner::{rules::parse_smell_action_list, PlannerConfig};
use crate::policy::{PolicyConfig, PolicyMode};
use std::path::Path;
use tracing::warn;

/// Values taken from `ARCHFIX_*` environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub max_ops: Option<usize>,
    pub max_files: Option<usize>,
    pub max_risk: Option<RiskLevel>,
    pub deny_patterns: Option<Vec<String>>,
    pub api_breaking_guard: Option<bool>,
    pub allow_test_files: Option<bool>,
    pub disabled_smell_actions: Option<Vec<String>>,
    pub verify_timeout: Option<u64>,
}

fn parse_count(key: &str, raw: &str) -> Option<usize> {
    match raw.trim().parse::<i64>() {
        Ok(n) => Some(n.max(1) as usize),
        Err(_) => {
            warn!("Ignoring {}={}: not an integer", key, raw);
            None
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup, so tests need not touch the process env
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            max_ops: lookup("ARCHFIX_AGENT_MAX_OPS")
                .and_then(|v| parse_count("ARCHFIX_AGENT_MAX_OPS", &v)),
            max_files: lookup("ARCHFIX_AGENT_MAX_FILES")
                .and_then(|v| parse_count("ARCHFIX_AGENT_MAX_FILES", &v)),
            max_risk: lookup("ARCHFIX_AGENT_MAX_RISK").and_then(|v| match v.parse() {
                Ok(risk) => Some(risk),
                Err(e) => {
                    warn!("Ignoring ARCHFIX_AGENT_MAX_RISK: {}", e);
                    None
                }
            }),
            deny_patterns: lookup("ARCHFIX_AGENT_DENY_PATTERNS").map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            }),
            api_breaking_guard: lookup("ARCHFIX_AGENT_API_BREAKING_GUARD").map(|v| parse_flag(&v)),
            allow_test_files: lookup("ARCHFIX_AGENT_ALLOW_TEST_FILES").map(|v| parse_flag(&v)),
            disabled_smell_actions: lookup("ARCHFIX_DISABLE_SMELL_ACTIONS")
                .map(|v| parse_smell_action_list(&v)),
            verify_timeout: lookup("ARCHFIX_VERIFY_TIMEOUT")
                .and_then(|v| parse_count("ARCHFIX_VERIFY_TIMEOUT", &v))
                .map(|n| n as u64),
        }
    }
}

/// Resolved verify settings before command-line overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySettings {
    pub command: Option<String>,
    pub timeout_secs: u64,
    pub python: String,
    pub check_metrics: bool,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub policy: PolicyConfig,
    pub planner: PlannerConfig,
    pub verify: VerifySettings,
    pub scan_exclude: Vec<String>,
}

impl AppConfig {
    /// Load `archfix.toml` from `root` and apply the process environment
    pub fn load(root: &Path, mode: Option<PolicyMode>) -> Self {
        Self::resolve(load_project_config(root), mode, &EnvOverrides::from_env())
    }

    pub fn resolve(file: ProjectConfig, mode: Option<PolicyMode>, env: &EnvOverrides) -> Self {
        let mut policy = file.policy.resolve(mode);
        if let Some(n) = env.max_ops {
            policy.max_ops = n;
        }
        if let Some(n) = env.max_files {
            policy.max_files = n;
        }
        if let Some(risk) = env.max_risk {
            policy.auto_apply_max_risk = risk;
        }
        if let Some(patterns) = &env.deny_patterns {
            policy.deny_patterns = patterns.clone();
        }
        if let Some(guard) = env.api_breaking_guard {
            policy.api_breaking_guard = guard;
        }
        if let Some(allow) = env.allow_test_files {
            policy.allow_test_files = allow;
        }

        let mut planner = file.planner;
        if let Some(extra) = &env.disabled_smell_actions {
            for pair in extra {
                if !planner.disabled_smell_actions.contains(pair) {
                    planner.disabled_smell_actions.push(pair.clone());
                }
            }
        }

        let verify = VerifySettings {
            command: file.verify.command,
            timeout_secs: env
                .verify_timeout
                .or(file.verify.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .max(1),
            python: file
                .verify
                .python
                .unwrap_or_else(|| DEFAULT_PYTHON.to_string()),
            check_metrics: file.verify.check_metrics,
        };

        Self {
            policy,
            planner,
            verify,
            scan_exclude: file.scan.exclude,
        }
    }

    /// Verify options with command-line overrides on top
    pub fn verify_options(
        &self,
        command_override: Option<String>,
        timeout_override: Option<u64>,
    ) -> VerifyOptions {
        VerifyOptions {
            command_override,
            configured_command: self.verify.command.clone(),
            timeout_secs: timeout_override
                .filter(|t| *t > 0)
                .unwrap_or(self.verify.timeout_secs),
            python: self.verify.python.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvOverrides {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvOverrides::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_env_parsing() {
        let overrides = env(&[
            ("ARCHFIX_AGENT_MAX_OPS", "0"),
            ("ARCHFIX_AGENT_MAX_FILES", "abc"),
            ("ARCHFIX_AGENT_MAX_RISK", "extreme"),
            ("ARCHFIX_AGENT_DENY_PATTERNS", "legacy/*, ,vendor/*"),
            ("ARCHFIX_AGENT_API_BREAKING_GUARD", "Yes"),
            ("ARCHFIX_AGENT_ALLOW_TEST_FILES", "0"),
            ("ARCHFIX_DISABLE_SMELL_ACTIONS", "hub|split_module,bogus"),
            ("ARCHFIX_VERIFY_TIMEOUT", "45"),
        ]);
        assert_eq!(overrides.max_ops, Some(1));
        assert_eq!(overrides.max_files, None);
        assert_eq!(overrides.max_risk, None);
        assert_eq!(
            overrides.deny_patterns,
            Some(vec!["legacy/*".to_string(), "vendor/*".to_string()])
        );
        assert_eq!(overrides.api_breaking_guard, Some(true));
        assert_eq!(overrides.allow_test_files, Some(false));
        assert_eq!(
            overrides.disabled_smell_actions,
            Some(vec!["hub|split_module".to_string()])
        );
        assert_eq!(overrides.verify_timeout, Some(45));
    }

    #[test]
    fn test_resolution_precedence() {
        let file = parse_project_config(
            "[policy]\nmode = \"hybrid\"\nmax_ops = 10\n[verify]\ntimeout_secs = 90\n",
        )
        .unwrap();
        let resolved = AppConfig::resolve(file.clone(), None, &EnvOverrides::default());
        assert_eq!(resolved.policy.mode, PolicyMode::Hybrid);
        assert_eq!(resolved.policy.max_ops, 10);
        assert_eq!(resolved.policy.max_files, 40);
        assert_eq!(resolved.verify.timeout_secs, 90);

        let with_env = AppConfig::resolve(
            file,
            Some(PolicyMode::Auto),
            &env(&[("ARCHFIX_AGENT_MAX_OPS", "5"), ("ARCHFIX_VERIFY_TIMEOUT", "7")]),
        );
        assert_eq!(with_env.policy.mode, PolicyMode::Auto);
        assert_eq!(with_env.policy.max_ops, 5);
        assert_eq!(with_env.verify.timeout_secs, 7);

        let options = with_env.verify_options(Some("true".into()), Some(3));
        assert_eq!(options.timeout_secs, 3);
        assert_eq!(options.command_override.as_deref(), Some("true"));
    }

    #[test]
    fn test_defaults_without_file() {
        let resolved = AppConfig::resolve(ProjectConfig::default(), None, &EnvOverrides::default());
        assert_eq!(resolved.policy, PolicyConfig::for_mode(PolicyMode::Assist));
        assert_eq!(resolved.verify.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolved.verify.python, DEFAULT_PYTHON);
    }
}
