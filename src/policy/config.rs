//! Policy configuration and mode defaults

use crate::error::ArchError;
use crate::learning::{ExecutionOutcome, LearningRecord};
use crate::models::RiskLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Glob patterns of files that re-export public API
const API_SURFACE_PATTERNS: [&str; 3] = ["*api*.py", "*__init__.py", "api.py"];

/// How much autonomy the apply stage has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// No gating; every decision is advisory
    #[default]
    Assist,
    /// Risky operations need manual approval
    Hybrid,
    /// Fully automated with a conservative risk ceiling
    Auto,
}

impl std::fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyMode::Assist => write!(f, "assist"),
            PolicyMode::Hybrid => write!(f, "hybrid"),
            PolicyMode::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for PolicyMode {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "assist" => Ok(PolicyMode::Assist),
            "hybrid" => Ok(PolicyMode::Hybrid),
            "auto" => Ok(PolicyMode::Auto),
            other => Err(ArchError::Config(format!("unknown policy mode '{}'", other))),
        }
    }
}

/// Fully resolved policy used by the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub mode: PolicyMode,
    pub max_ops: usize,
    pub max_files: usize,
    pub allow_test_files: bool,
    pub auto_apply_max_risk: RiskLevel,
    pub deny_patterns: Vec<String>,
    pub api_breaking_guard: bool,
}

impl PolicyConfig {
    /// Defaults for a mode
    pub fn for_mode(mode: PolicyMode) -> Self {
        let (max_ops, max_files, auto_apply_max_risk, api_breaking_guard) = match mode {
            PolicyMode::Assist => (200, 100, RiskLevel::High, false),
            PolicyMode::Hybrid => (80, 40, RiskLevel::Low, true),
            PolicyMode::Auto => (120, 60, RiskLevel::Medium, true),
        };
        Self {
            mode,
            max_ops,
            max_files,
            allow_test_files: false,
            auto_apply_max_risk,
            deny_patterns: Vec::new(),
            api_breaking_guard,
        }
    }

    pub fn allows_risk(&self, risk: RiskLevel) -> bool {
        risk <= self.auto_apply_max_risk
    }

    pub fn matches_deny_pattern(&self, target_file: &str) -> Option<&str> {
        if target_file.is_empty() {
            return None;
        }
        let path = target_file.replace('\\', "/");
        self.deny_patterns
            .iter()
            .find(|p| fnmatch(&path, p))
            .map(String::as_str)
    }

    pub fn is_api_surface_file(target_file: &str) -> bool {
        if target_file.is_empty() {
            return false;
        }
        let path = target_file.replace('\\', "/");
        API_SURFACE_PATTERNS.iter().any(|p| fnmatch(&path, p))
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::for_mode(PolicyMode::default())
    }
}

/// `[policy]` section: anything unset falls back to the mode defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    pub mode: Option<PolicyMode>,
    pub max_ops: Option<usize>,
    pub max_files: Option<usize>,
    pub allow_test_files: Option<bool>,
    pub auto_apply_max_risk: Option<RiskLevel>,
    pub deny_patterns: Option<Vec<String>>,
    pub api_breaking_guard: Option<bool>,
}

impl PolicySection {
    /// Resolve against the defaults of `mode` (or the section's own mode)
    pub fn resolve(&self, mode: Option<PolicyMode>) -> PolicyConfig {
        let base = PolicyConfig::for_mode(mode.or(self.mode).unwrap_or_default());
        PolicyConfig {
            max_ops: self.max_ops.unwrap_or(base.max_ops).max(1),
            max_files: self.max_files.unwrap_or(base.max_files).max(1),
            allow_test_files: self.allow_test_files.unwrap_or(base.allow_test_files),
            auto_apply_max_risk: self.auto_apply_max_risk.unwrap_or(base.auto_apply_max_risk),
            deny_patterns: self
                .deny_patterns
                .clone()
                .unwrap_or_else(|| base.deny_patterns.clone()),
            api_breaking_guard: self.api_breaking_guard.unwrap_or(base.api_breaking_guard),
            mode: base.mode,
        }
    }
}

/// Translate a shell glob (`*`, `?`, `[seq]`, `[!seq]`) into an anchored regex
///
/// A `]` right after `[` or `[!` belongs to the set, and a `[` with no
/// closing `]` is a literal.
fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                match chars.get(j..).and_then(|rest| rest.iter().position(|&c| c == ']')) {
                    Some(offset) => {
                        let close = j + offset;
                        let (negated, body) = match &chars[i + 1..close] {
                            ['!', rest @ ..] => (true, rest),
                            body => (false, body),
                        };
                        out.push('[');
                        if negated {
                            out.push('^');
                        }
                        for &c in body {
                            if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~' | '|') {
                                out.push('\\');
                            }
                            out.push(c);
                        }
                        out.push(']');
                        i = close;
                    }
                    None => out.push_str("\\["),
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    out
}

/// Shell-style match where `*` also crosses `/`
pub fn fnmatch(path: &str, pattern: &str) -> bool {
    Regex::new(&glob_to_regex(pattern))
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

/// Observed apply behaviour over recent runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub apply_rate: Option<f64>,
    pub rollback_rate: Option<f64>,
}

impl Telemetry {
    /// Rates over the most recent `window` learning records
    pub fn from_records(records: &[LearningRecord], window: usize) -> Self {
        let recent = &records[records.len().saturating_sub(window)..];
        let mut ops = 0usize;
        let mut applied = 0usize;
        let mut verified = 0usize;
        let mut rolled_back = 0usize;
        for record in recent {
            for op in &record.operations {
                ops += 1;
                if op.resolve_outcome(record.verify_success) != ExecutionOutcome::NotApplied {
                    applied += 1;
                }
            }
            if let Some(success) = record.verify_success {
                verified += 1;
                if !success {
                    rolled_back += 1;
                }
            }
        }
        Self {
            apply_rate: (ops > 0).then(|| applied as f64 / ops as f64),
            rollback_rate: (verified > 0).then(|| rolled_back as f64 / verified as f64),
        }
    }
}

/// Environment overrides worth setting given recent telemetry
pub fn suggest_policy_from_telemetry(telemetry: &Telemetry) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if telemetry.apply_rate.is_some_and(|r| r < 0.3) {
        out.insert("ARCHFIX_AGENT_MAX_OPS".to_string(), "40".to_string());
    }
    if telemetry.rollback_rate.is_some_and(|r| r > 0.5) {
        let current = out
            .get("ARCHFIX_AGENT_MAX_OPS")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(80);
        out.insert("ARCHFIX_AGENT_MAX_OPS".to_string(), current.min(40).to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults() {
        let hybrid = PolicyConfig::for_mode(PolicyMode::Hybrid);
        assert_eq!(hybrid.max_ops, 80);
        assert_eq!(hybrid.auto_apply_max_risk, RiskLevel::Low);
        assert!(hybrid.api_breaking_guard);
        let assist = PolicyConfig::for_mode(PolicyMode::Assist);
        assert_eq!((assist.max_ops, assist.max_files), (200, 100));
        assert!(!assist.api_breaking_guard);
        assert!(assist.allows_risk(RiskLevel::High));
        assert!(!PolicyConfig::for_mode(PolicyMode::Auto).allows_risk(RiskLevel::High));
    }

    #[test]
    fn test_section_resolution() {
        let section = PolicySection {
            mode: Some(PolicyMode::Auto),
            max_ops: Some(0),
            ..Default::default()
        };
        let resolved = section.resolve(None);
        assert_eq!(resolved.mode, PolicyMode::Auto);
        assert_eq!(resolved.max_ops, 1);
        assert_eq!(resolved.max_files, 60);
        // an explicit mode wins over the file
        assert_eq!(section.resolve(Some(PolicyMode::Hybrid)).max_files, 40);
    }

    #[test]
    fn test_fnmatch() {
        assert!(fnmatch("pkg/core_api.py", "*api*.py"));
        assert!(fnmatch("pkg/__init__.py", "*__init__.py"));
        assert!(fnmatch("api.py", "api.py"));
        assert!(!fnmatch("apiary/x.txt", "*api*.py"));
        assert!(fnmatch("legacy/old.py", "legacy/*"));
        assert!(fnmatch("a1.py", "a[0-9].py"));
        assert!(!fnmatch("a1.py", "a[!0-9].py"));
        assert!(fnmatch("a.py", "?.py"));
        assert!(fnmatch("a+b.py", "a+b.py"));
    }

    #[test]
    fn test_fnmatch_bracket_edge_cases() {
        assert!(fnmatch("a[b.py", "a[b.py"));
        assert!(fnmatch("[", "[[]"));
        assert!(fnmatch("]", "[]]"));
        assert!(fnmatch("x", "[!]]"));
        assert!(!fnmatch("]", "[!]]"));
        assert!(fnmatch("a&b", "a[&]b"));
        assert!(fnmatch("gen/[x].py", "gen/[[]x].py"));
    }

    #[test]
    fn test_api_surface() {
        assert!(PolicyConfig::is_api_surface_file("pkg/__init__.py"));
        assert!(PolicyConfig::is_api_surface_file("web_api.py"));
        assert!(!PolicyConfig::is_api_surface_file("core.py"));
    }

    #[test]
    fn test_suggest_policy_from_telemetry() {
        let low_apply = Telemetry {
            apply_rate: Some(0.1),
            rollback_rate: None,
        };
        assert_eq!(
            suggest_policy_from_telemetry(&low_apply).get("ARCHFIX_AGENT_MAX_OPS"),
            Some(&"40".to_string())
        );
        let rollbacks = Telemetry {
            apply_rate: Some(0.9),
            rollback_rate: Some(0.8),
        };
        assert_eq!(
            suggest_policy_from_telemetry(&rollbacks).get("ARCHFIX_AGENT_MAX_OPS"),
            Some(&"40".to_string())
        );
        assert!(suggest_policy_from_telemetry(&Telemetry::default()).is_empty());
    }

    #[test]
    fn test_telemetry_from_records() {
        use crate::learning::LearningOperation;
        use crate::models::ActionKind;

        let op = |outcome| LearningOperation {
            target_file: "a.py".into(),
            kind: ActionKind::RemoveUnusedImport,
            smell_type: None,
            execution_outcome: Some(outcome),
        };
        let records = vec![
            LearningRecord::new(".", vec![], vec![op(ExecutionOutcome::VerifyFail)], vec![], Some(false)),
            LearningRecord::new(
                ".",
                vec![],
                vec![op(ExecutionOutcome::VerifySuccess), op(ExecutionOutcome::NotApplied)],
                vec![],
                Some(true),
            ),
        ];
        let telemetry = Telemetry::from_records(&records, 10);
        assert_eq!(telemetry.rollback_rate, Some(0.5));
        assert!((telemetry.apply_rate.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(Telemetry::from_records(&[], 10), Telemetry::default());
    }
}
