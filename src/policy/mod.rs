//! Policy gate for patch operations
//!
//! Every operation is evaluated independently into `allow`, `review` or
//! `deny`, together with a human-readable explanation. The pipeline is:
//!
//! ```text
//! hard block ─► core rules ─► weak pairs ─► repeated failures
//!                                              │
//!                    whitelist ◄─ learning deny candidates
//! ```
//!
//! Hard blocks always deny. Later stages may only tighten a decision,
//! except the whitelist, which may only loosen it.

pub mod config;
pub mod runtime;
pub mod session;
pub mod whitelist;

pub use config::{suggest_policy_from_telemetry, PolicyConfig, PolicyMode, PolicySection, Telemetry};
pub use runtime::{
    apply_runtime_policy, deprioritize_weak_pairs, DecisionRecord, DecisionSummary,
    RuntimePolicyOutcome,
};
pub use session::SessionMemory;
pub use whitelist::{Whitelist, WhitelistEntry};

use crate::learning::TargetStats;
use crate::models::{file_name, ActionKind, PatchOperation, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Smell/action pairs with a poor track record
pub const WEAK_PAIRS: [(&str, ActionKind); 6] = [
    ("hub", ActionKind::SplitModule),
    ("bottleneck", ActionKind::IntroduceFacade),
    ("long_function", ActionKind::ExtractNestedFunction),
    ("deep_nesting", ActionKind::ExtractBlockToHelper),
    ("long_function", ActionKind::ExtractBlockToHelper),
    ("god_class", ActionKind::ExtractClass),
];

/// Operations that are never applied, keyed by target file name
pub const DEFAULT_HARD_BLOCKS: [(ActionKind, &str); 5] = [
    (ActionKind::SplitModule, "patch_engine.py"),
    (ActionKind::SplitModule, "patch_apply.py"),
    (ActionKind::RefactorModule, "patch_engine.py"),
    (ActionKind::RefactorModule, "patch_apply.py"),
    (ActionKind::ExtractClass, "__init__.py"),
];

const ROLLBACK_PLAN: &str = "Automatic rollback is triggered on verify failure.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    Allow,
    Review,
    Deny,
}

impl std::fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyDecision::Allow => write!(f, "allow"),
            PolicyDecision::Review => write!(f, "review"),
            PolicyDecision::Deny => write!(f, "deny"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explainability {
    pub why: String,
    pub risk: RiskLevel,
    pub expected_outcome: String,
    pub rollback_plan: String,
    pub policy_decision: PolicyDecision,
    pub policy_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPolicyResult {
    pub decision: PolicyDecision,
    pub risk: RiskLevel,
    pub reason: String,
    pub explainability: Explainability,
}

/// Run-wide inputs the gate consults besides the config
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub hard_blocks: Vec<(ActionKind, String)>,
    /// Verify failures per operation key, from session memory
    pub failure_counts: BTreeMap<String, usize>,
    pub deny_candidates: Vec<TargetStats>,
    pub whitelist: Whitelist,
    /// Operation keys dropped before evaluation (rejections, repeat failures)
    pub skip_keys: BTreeSet<String>,
}

impl Default for PolicyContext {
    fn default() -> Self {
        Self {
            hard_blocks: DEFAULT_HARD_BLOCKS
                .iter()
                .map(|(kind, file)| (*kind, file.to_string()))
                .collect(),
            failure_counts: BTreeMap::new(),
            deny_candidates: Vec::new(),
            whitelist: Whitelist::default(),
            skip_keys: BTreeSet::new(),
        }
    }
}

pub fn estimate_risk(kind: ActionKind) -> RiskLevel {
    match kind {
        ActionKind::RemoveUnusedImport
        | ActionKind::RemoveCyclicImport
        | ActionKind::FixImport
        | ActionKind::CreateModuleStub => RiskLevel::Low,
        ActionKind::SplitModule
        | ActionKind::ExtractClass
        | ActionKind::ExtractBlockToHelper
        | ActionKind::RefactorModule => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

pub fn expected_outcome(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::RemoveUnusedImport => "Unused imports are removed without changing behavior.",
        ActionKind::RemoveCyclicImport => "Cycle edge is removed and imports become acyclic.",
        ActionKind::SplitModule => {
            "Oversized module is decomposed into a focused extracted module."
        }
        ActionKind::ExtractClass => "Class responsibilities are extracted into a dedicated module.",
        ActionKind::RefactorCodeSmell => "Code smell marker is applied as a refactoring TODO.",
        _ => "Operation is applied and verified in the patch cycle.",
    }
}

pub fn is_weak_pair(op: &PatchOperation) -> bool {
    let smell = op.smell_type.as_deref().unwrap_or("").trim();
    WEAK_PAIRS.iter().any(|(s, k)| *s == smell && *k == op.kind)
}

fn hard_block(op: &PatchOperation, context: &PolicyContext) -> Option<String> {
    let name = file_name(&op.target_file);
    context
        .hard_blocks
        .iter()
        .any(|(kind, file)| *kind == op.kind && file == name)
        .then(|| format!("hard-blocked operation: {} on {}", op.kind, name))
}

fn core_rules(
    op: &PatchOperation,
    config: &PolicyConfig,
    index: usize,
    seen_files: &BTreeSet<String>,
    risk: RiskLevel,
) -> (PolicyDecision, String) {
    let target = op.target_file.as_str();
    let hybrid = config.mode == PolicyMode::Hybrid;
    if target.starts_with("tests/") && !config.allow_test_files {
        return (PolicyDecision::Deny, "test files are blocked by policy".into());
    }
    if config.matches_deny_pattern(target).is_some() {
        return (
            PolicyDecision::Deny,
            format!("file matches deny pattern: {}", target),
        );
    }
    if index > config.max_ops {
        return (
            PolicyDecision::Deny,
            format!("operation limit exceeded (max_ops={})", config.max_ops),
        );
    }
    if !target.is_empty() && !seen_files.contains(target) && seen_files.len() >= config.max_files {
        return (
            PolicyDecision::Deny,
            format!("file scope limit exceeded (max_files={})", config.max_files),
        );
    }
    if config.api_breaking_guard
        && PolicyConfig::is_api_surface_file(target)
        && risk >= RiskLevel::Medium
    {
        return if hybrid {
            (
                PolicyDecision::Review,
                "API surface file requires manual approval".into(),
            )
        } else {
            (
                PolicyDecision::Deny,
                "API surface file blocked by api_breaking_guard".into(),
            )
        };
    }
    if !config.allows_risk(risk) {
        return if hybrid {
            (
                PolicyDecision::Review,
                format!("risk={} requires manual approval in hybrid mode", risk),
            )
        } else {
            (
                PolicyDecision::Deny,
                format!(
                    "risk={} exceeds auto_apply_max_risk={}",
                    risk, config.auto_apply_max_risk
                ),
            )
        };
    }
    (PolicyDecision::Allow, "allowed by policy".into())
}

fn learning_deny_match<'a>(op: &PatchOperation, context: &'a PolicyContext) -> Option<&'a TargetStats> {
    let smell = op.smell_type.as_deref().unwrap_or("unknown");
    context.deny_candidates.iter().find(|c| {
        c.smell_type == smell && c.action_kind == op.kind.as_str() && c.target_file == op.target_file
    })
}

/// Evaluate one operation; `index` is 1-based within the run
pub fn evaluate(
    op: &PatchOperation,
    config: &PolicyConfig,
    index: usize,
    seen_files: &BTreeSet<String>,
    context: &PolicyContext,
) -> OperationPolicyResult {
    let risk = estimate_risk(op.kind);
    let (decision, reason) = match hard_block(op, context) {
        Some(reason) => (PolicyDecision::Deny, reason),
        None => gate(op, config, index, seen_files, context, risk),
    };
    let explainability = Explainability {
        why: if op.description.trim().is_empty() {
            "No description provided.".to_string()
        } else {
            op.description.clone()
        },
        risk,
        expected_outcome: expected_outcome(op.kind).to_string(),
        rollback_plan: ROLLBACK_PLAN.to_string(),
        policy_decision: decision,
        policy_reason: reason.clone(),
    };
    OperationPolicyResult {
        decision,
        risk,
        reason,
        explainability,
    }
}

fn gate(
    op: &PatchOperation,
    config: &PolicyConfig,
    index: usize,
    seen_files: &BTreeSet<String>,
    context: &PolicyContext,
    risk: RiskLevel,
) -> (PolicyDecision, String) {
    let (mut decision, mut reason) = core_rules(op, config, index, seen_files, risk);
    let mode = config.mode;

    if decision != PolicyDecision::Deny && is_weak_pair(op) {
        let pair = op.smell_action_key();
        (decision, reason) = if mode == PolicyMode::Hybrid {
            (
                PolicyDecision::Review,
                format!("historically weak pair requires manual approval: {}", pair),
            )
        } else {
            (
                PolicyDecision::Deny,
                format!("historically weak pair blocked in auto mode: {}", pair),
            )
        };
    }

    let failures = context
        .failure_counts
        .get(&op.operation_key())
        .copied()
        .unwrap_or(0);
    if failures >= session::REPEATED_FAILURE_THRESHOLD {
        match mode {
            PolicyMode::Auto => {
                decision = PolicyDecision::Deny;
                reason = "blocked after repeated verify failures".into();
            }
            PolicyMode::Hybrid if decision != PolicyDecision::Deny => {
                decision = PolicyDecision::Review;
                reason = "manual approval required after repeated verify failures".into();
            }
            _ => {}
        }
    }

    if let Some(candidate) = learning_deny_match(op, context) {
        let learned = format!(
            "learning: low verify success for {}|{} on {}",
            candidate.smell_type, candidate.action_kind, candidate.target_file
        );
        match mode {
            PolicyMode::Auto => {
                decision = PolicyDecision::Deny;
                reason = learned;
            }
            PolicyMode::Hybrid if decision != PolicyDecision::Deny => {
                decision = PolicyDecision::Review;
                reason = learned;
            }
            _ => {}
        }
    }

    if let Some(entry) = context.whitelist.find(op) {
        match mode {
            PolicyMode::Auto if entry.allow_in_auto => {
                decision = PolicyDecision::Allow;
                reason = "allowed by whitelisted target".into();
            }
            PolicyMode::Hybrid if entry.allow_in_hybrid && decision == PolicyDecision::Deny => {
                decision = PolicyDecision::Review;
                reason = "whitelisted target requires manual approval".into();
            }
            _ => {}
        }
    }

    (decision, reason)
}
