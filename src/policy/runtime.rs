//! Fold the policy gate over a whole plan

use super::{evaluate, is_weak_pair, Explainability, PolicyConfig, PolicyContext, PolicyDecision, PolicyMode};
use crate::models::{ActionKind, PatchOperation, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub index: usize,
    pub target_file: String,
    pub kind: ActionKind,
    pub decision: PolicyDecision,
    pub reason: String,
    pub risk: RiskLevel,
    pub explainability: Explainability,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub blocked_by_policy: usize,
    /// Reserved for an external reviewer stage; never set by the gate
    pub blocked_by_critic: usize,
    pub blocked_by_human: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimePolicyOutcome {
    pub kept: Vec<PatchOperation>,
    pub decisions: Vec<DecisionRecord>,
    /// Operations skipped by campaign memory before evaluation
    pub skipped: Vec<PatchOperation>,
    pub decision_summary: DecisionSummary,
}

/// Move weak pairs to the end so the op limit cuts them first
pub fn deprioritize_weak_pairs(operations: Vec<PatchOperation>) -> Vec<PatchOperation> {
    let (strong, weak): (Vec<_>, Vec<_>) = operations.into_iter().partition(|op| !is_weak_pair(op));
    strong.into_iter().chain(weak).collect()
}

/// Skip campaign keys, then evaluate every operation in order
///
/// A file only counts toward `max_files` once one of its operations is
/// kept. Assist mode keeps everything; hybrid also keeps `review`.
pub fn apply_runtime_policy(
    operations: &[PatchOperation],
    config: &PolicyConfig,
    context: &PolicyContext,
) -> RuntimePolicyOutcome {
    let (candidates, skipped): (Vec<PatchOperation>, Vec<PatchOperation>) = operations
        .iter()
        .cloned()
        .partition(|op| !context.skip_keys.contains(&op.operation_key()));
    if !skipped.is_empty() {
        info!("Skipping {} operations from campaign memory", skipped.len());
    }
    let candidates = deprioritize_weak_pairs(candidates);

    let mut seen_files: BTreeSet<String> = BTreeSet::new();
    let mut kept = Vec::new();
    let mut decisions = Vec::new();
    for (offset, op) in candidates.into_iter().enumerate() {
        let index = offset + 1;
        let result = evaluate(&op, config, index, &seen_files, context);
        debug!(
            "[{}] {} {} -> {} ({})",
            index, op.kind, op.target_file, result.decision, result.reason
        );
        let keep = config.mode == PolicyMode::Assist
            || result.decision == PolicyDecision::Allow
            || (result.decision == PolicyDecision::Review && config.mode == PolicyMode::Hybrid);
        decisions.push(DecisionRecord {
            index,
            target_file: op.target_file.clone(),
            kind: op.kind,
            decision: result.decision,
            reason: result.reason,
            risk: result.risk,
            explainability: result.explainability,
        });
        if keep {
            if !op.target_file.is_empty() {
                seen_files.insert(op.target_file.clone());
            }
            kept.push(op);
        }
    }

    let decision_summary = DecisionSummary {
        blocked_by_policy: decisions.len() - kept.len(),
        blocked_by_critic: 0,
        blocked_by_human: skipped.len(),
    };
    RuntimePolicyOutcome {
        kept,
        decisions,
        skipped,
        decision_summary,
    }
}
