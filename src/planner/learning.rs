//! Post-processing of synthesized operations
//!
//! Drops operations whose marker is already in the file, removes disabled
//! `smell|action` pairs, and uses learning statistics to demote or drop
//! pairs with a poor track record before reordering by success rate.

use super::rules::{
    diff_hints_for, fallback_kind_for_low_success, MIN_SUCCESS_RATE, MIN_TOTAL_FOR_FILTER,
};
use crate::learning::LearningStats;
use crate::models::{ActionKind, PatchOperation};
use std::path::Path;
use tracing::debug;

/// TODO block appended by the generic refactor operations
pub fn render_todo_diff(target: &str, smell_type: &str, kind: ActionKind, hints: &[String]) -> String {
    let hint_lines: Vec<String> = hints.iter().map(|h| format!("# - {}", h)).collect();
    format!(
        "# TODO: Refactor {} ({} -> {})\n# Suggested steps:\n{}\n",
        target,
        smell_type,
        kind,
        hint_lines.join("\n")
    )
}

/// Marker comment that identifies an already-annotated module
pub fn refactor_marker(target: &str) -> String {
    format!("# TODO: Refactor {}", target)
}

/// False when the append-style TODO is already present in the target
pub fn should_emit_default_todo_op(root: &Path, op: &PatchOperation) -> bool {
    if !op.kind.is_append_style() {
        return true;
    }
    let Ok(content) = std::fs::read_to_string(root.join(&op.target_file)) else {
        return true;
    };
    let diff = op.diff.trim();
    if !diff.is_empty() && content.contains(diff) {
        return false;
    }
    if matches!(op.kind, ActionKind::RefactorModule | ActionKind::SplitModule)
        && content.contains(&refactor_marker(&op.target_file))
    {
        return false;
    }
    true
}

/// Same operation under a different kind, with matching hints
pub fn rebuild_operation_with_kind(op: &PatchOperation, new_kind: ActionKind) -> PatchOperation {
    let smell_type = op.smell_type.as_deref().unwrap_or("unknown");
    let hints: Vec<String> = diff_hints_for(smell_type, new_kind)
        .iter()
        .map(|h| h.to_string())
        .collect();
    let params = match new_kind {
        ActionKind::RefactorModule | ActionKind::RefactorCodeSmell => None,
        _ => op.params.clone(),
    };
    PatchOperation {
        target_file: op.target_file.clone(),
        kind: new_kind,
        description: op.description.clone(),
        diff: render_todo_diff(&op.target_file, smell_type, new_kind, &hints),
        smell_type: op.smell_type.clone(),
        params,
    }
}

/// Marker filter, learning-based demotion, then the configured denylist
pub fn apply_smell_action_filters(
    root: &Path,
    operations: Vec<PatchOperation>,
    learning: Option<&LearningStats>,
    disabled: &[String],
) -> Vec<PatchOperation> {
    let mut filtered: Vec<PatchOperation> = Vec::new();
    for op in operations {
        if !should_emit_default_todo_op(root, &op) {
            debug!("Suppressing {} on {}: marker present", op.kind, op.target_file);
            continue;
        }
        let stats = learning
            .filter(|l| !l.is_empty())
            .and_then(|l| l.get(&op.smell_action_key()));
        match stats {
            Some(s) if s.total >= MIN_TOTAL_FOR_FILTER && s.success_rate() < MIN_SUCCESS_RATE => {
                let smell = op.smell_type.as_deref().unwrap_or("unknown");
                match fallback_kind_for_low_success(smell, op.kind) {
                    Some(kind) => filtered.push(rebuild_operation_with_kind(&op, kind)),
                    None => debug!(
                        "Dropping {} (success rate {:.2})",
                        op.smell_action_key(),
                        s.success_rate()
                    ),
                }
            }
            _ => filtered.push(op),
        }
    }
    if !disabled.is_empty() {
        filtered.retain(|op| !disabled.contains(&op.smell_action_key()));
    }
    filtered
}

fn success_rate_for(op: &PatchOperation, learning: &LearningStats) -> f64 {
    learning
        .get(&op.smell_action_key())
        .map(|s| s.success_rate())
        .unwrap_or(0.0)
}

/// Stable sort by historical success and renumber `[N]` prefixes
pub fn sort_and_reindex_by_learning(
    operations: Vec<PatchOperation>,
    learning: Option<&LearningStats>,
) -> Vec<PatchOperation> {
    let Some(learning) = learning.filter(|l| !l.is_empty()) else {
        return operations;
    };
    let mut ordered = operations;
    ordered.sort_by(|a, b| success_rate_for(b, learning).total_cmp(&success_rate_for(a, learning)));
    for (idx, op) in ordered.iter_mut().enumerate() {
        if op.description.starts_with('[') {
            let rest = op
                .description
                .split_once(']')
                .map(|(_, rest)| rest.trim_start())
                .unwrap_or("");
            op.description = format!("[{}] {}", idx + 1, rest);
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::OutcomeStats;
    use crate::models::OpParams;
    use tempfile::TempDir;

    fn op(target: &str, kind: ActionKind, smell: &str, desc: &str) -> PatchOperation {
        PatchOperation {
            target_file: target.into(),
            kind,
            description: desc.into(),
            diff: render_todo_diff(target, smell, kind, &["step".to_string()]),
            smell_type: Some(smell.into()),
            params: Some(OpParams {
                imports_from: Some(vec!["x.py".into()]),
                ..Default::default()
            }),
        }
    }

    fn stats(total: usize, success: usize) -> OutcomeStats {
        OutcomeStats {
            total,
            success,
            verify_success: success,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_todo_diff() {
        let diff = render_todo_diff("a.py", "hub", ActionKind::SplitModule, &["one".into(), "two".into()]);
        assert_eq!(
            diff,
            "# TODO: Refactor a.py (hub -> split_module)\n# Suggested steps:\n# - one\n# - two\n"
        );
    }

    #[test]
    fn test_marker_suppresses_append_ops() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n# TODO: Refactor a.py (old)\n").unwrap();
        let refactor = op("a.py", ActionKind::RefactorModule, "hub", "[1] r");
        assert!(!should_emit_default_todo_op(dir.path(), &refactor));

        let facade = op("a.py", ActionKind::IntroduceFacade, "bottleneck", "[1] f");
        assert!(should_emit_default_todo_op(dir.path(), &facade));

        let missing = op("b.py", ActionKind::SplitModule, "hub", "[1] s");
        assert!(should_emit_default_todo_op(dir.path(), &missing));
    }

    #[test]
    fn test_low_success_rebuilds_or_drops() {
        let dir = TempDir::new().unwrap();
        let mut learning = LearningStats::new();
        learning.insert("hub|split_module".into(), stats(4, 0));
        learning.insert("god_module|split_module".into(), stats(3, 0));

        let ops = vec![
            op("a.py", ActionKind::SplitModule, "hub", "[1] a"),
            op("b.py", ActionKind::SplitModule, "god_module", "[2] b"),
        ];
        let out = apply_smell_action_filters(dir.path(), ops, Some(&learning), &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ActionKind::RefactorModule);
        assert!(out[0].params.is_none());
        assert!(out[0].diff.contains("(hub -> refactor_module)"));
    }

    #[test]
    fn test_small_samples_not_filtered() {
        let dir = TempDir::new().unwrap();
        let mut learning = LearningStats::new();
        learning.insert("hub|split_module".into(), stats(2, 0));
        let ops = vec![op("a.py", ActionKind::SplitModule, "hub", "[1] a")];
        let out = apply_smell_action_filters(dir.path(), ops, Some(&learning), &[]);
        assert_eq!(out[0].kind, ActionKind::SplitModule);
    }

    #[test]
    fn test_disabled_pairs() {
        let dir = TempDir::new().unwrap();
        let ops = vec![
            op("a.py", ActionKind::SplitModule, "hub", "[1] a"),
            op("b.py", ActionKind::IntroduceFacade, "bottleneck", "[2] b"),
        ];
        let out = apply_smell_action_filters(dir.path(), ops, None, &["hub|split_module".into()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_file, "b.py");
    }

    #[test]
    fn test_reindex_by_success_rate() {
        let mut learning = LearningStats::new();
        learning.insert("bottleneck|introduce_facade".into(), stats(4, 4));
        learning.insert("hub|split_module".into(), stats(4, 2));
        let ops = vec![
            op("a.py", ActionKind::SplitModule, "hub", "[1] Refactor module a.py"),
            op("b.py", ActionKind::IntroduceFacade, "bottleneck", "[2] Refactor module b.py"),
            op("c.py", ActionKind::RemoveCyclicImport, "cyclic_dependency", "Remove import"),
        ];
        let out = sort_and_reindex_by_learning(ops.clone(), Some(&learning));
        assert_eq!(out[0].description, "[1] Refactor module b.py");
        assert_eq!(out[1].description, "[2] Refactor module a.py");
        assert_eq!(out[2].description, "Remove import");

        assert_eq!(sort_and_reindex_by_learning(ops.clone(), None), ops);
    }
}
