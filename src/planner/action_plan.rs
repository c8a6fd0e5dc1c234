//! Architecture plan steps and the action plan derived from them
//!
//! The architecture plan is the explainable, per-module view ("why this
//! module, what kind of change"). The action plan collapses it into risk and
//! benefit estimates, nudged by learning statistics.

use super::rules::{refactor_kind_for_smells, StepKind};
use crate::history::Trends;
use crate::learning::LearningStats;
use crate::models::{ActionKind, ArchSmell};
use crate::scoring::ScoredModule;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP_COUNT: usize = 5;

const LEARNING_BUMP: f64 = 0.05;
const LEARNING_BUMP_MIN_RATE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub target: String,
    pub kind: StepKind,
    pub priority: usize,
    pub rationale: String,
    pub hints: Vec<String>,
    pub smell_type: Option<String>,
}

/// Inputs the plan was derived from, kept for explainability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedFrom {
    pub summary_risks: Vec<String>,
    pub history_trends: Trends,
    pub history_regressions: Vec<String>,
    pub priorities_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitecturePlan {
    pub project_root: String,
    pub generated_from: GeneratedFrom,
    pub steps: Vec<PlanStep>,
}

fn step_hint(kind: StepKind) -> &'static str {
    match kind {
        StepKind::SplitModule => "Extract coherent sub-responsibilities into separate modules.",
        StepKind::IntroduceFacade => "Introduce a facade or boundary to reduce direct fan-in.",
        StepKind::SplitResponsibility => {
            "Split outgoing dependencies across clearer layers or services."
        }
        StepKind::BreakCycle => "Break import cycles via inversion of dependencies or adapters.",
        StepKind::RefactorModule => "Refactor the module to reduce its structural load.",
    }
}

/// Most severe smell; the first one wins ties
pub(crate) fn dominant_smell<'a>(smells: &[&'a ArchSmell]) -> Option<&'a ArchSmell> {
    smells.iter().copied().fold(None, |best, smell| match best {
        Some(b) if b.severity >= smell.severity => Some(b),
        _ => Some(smell),
    })
}

/// One step per ranked module that carries at least one smell
pub fn build_architecture_plan(
    project_root: &str,
    priorities: &[ScoredModule],
    smells: &[ArchSmell],
    generated_from: GeneratedFrom,
) -> ArchitecturePlan {
    let mut steps = Vec::new();
    for (idx, module) in priorities.iter().take(DEFAULT_STEP_COUNT).enumerate() {
        let node_smells: Vec<&ArchSmell> = smells
            .iter()
            .filter(|s| s.nodes.contains(&module.name))
            .collect();
        if node_smells.is_empty() {
            continue;
        }
        let types: Vec<_> = node_smells.iter().map(|s| s.smell_type).collect();
        let kind = refactor_kind_for_smells(&types);
        let descriptions: Vec<String> = node_smells
            .iter()
            .map(|s| format!("{} (severity={:.2})", s.smell_type, s.severity))
            .collect();
        steps.push(PlanStep {
            id: format!("STEP-{:03}", steps.len() + 1),
            target: module.name.clone(),
            kind,
            priority: idx + 1,
            rationale: format!(
                "Module {} is prioritized due to: {}",
                module.name,
                descriptions.join(", ")
            ),
            hints: vec![step_hint(kind).to_string()],
            smell_type: dominant_smell(&node_smells).map(|s| s.smell_type.to_string()),
        });
    }
    ArchitecturePlan {
        project_root: project_root.to_string(),
        generated_from,
        steps,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionKind,
    pub target: String,
    pub description: String,
    pub risk: f64,
    pub expected_benefit: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRef {
    pub index: usize,
    pub action_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
    pub priority: Vec<PriorityRef>,
    pub total_risk: f64,
    pub expected_gain: f64,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Action type for a step; splits are tracked as module refactors here
fn action_type_for_step(kind: StepKind) -> ActionKind {
    match kind {
        StepKind::IntroduceFacade => ActionKind::IntroduceFacade,
        StepKind::BreakCycle => ActionKind::RefactorDependencies,
        StepKind::SplitModule | StepKind::SplitResponsibility | StepKind::RefactorModule => {
            ActionKind::RefactorModule
        }
    }
}

fn base_risk(kind: StepKind) -> f64 {
    match kind {
        StepKind::SplitModule | StepKind::BreakCycle => 0.5,
        StepKind::IntroduceFacade => 0.4,
        _ => 0.3,
    }
}

fn step_to_action(step: &PlanStep, learning: Option<&LearningStats>) -> Action {
    let action_type = action_type_for_step(step.kind);
    let mut expected_benefit = (1.0 - 0.1 * (step.priority as f64 - 1.0)).max(0.3);
    if let Some(stats) = learning {
        let pair_key = format!(
            "{}|{}",
            step.smell_type.as_deref().unwrap_or("unknown"),
            action_type
        );
        let entry = stats
            .get(&pair_key)
            .or_else(|| stats.get(action_type.as_str()));
        if let Some(entry) = entry {
            if entry.total >= 1 && entry.success_rate() >= LEARNING_BUMP_MIN_RATE {
                expected_benefit = (expected_benefit + LEARNING_BUMP).min(1.0);
            }
        }
    }
    Action {
        action_type,
        target: step.target.clone(),
        description: format!("{} on {}: {}", step.kind, step.target, step.rationale),
        risk: round3(base_risk(step.kind)),
        expected_benefit: round3(expected_benefit),
    }
}

pub fn build_action_plan(plan: &ArchitecturePlan, learning: Option<&LearningStats>) -> ActionPlan {
    let actions: Vec<Action> = plan
        .steps
        .iter()
        .map(|step| step_to_action(step, learning))
        .collect();
    let priority = plan
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| PriorityRef {
            index,
            action_id: step.id.clone(),
        })
        .collect();
    ActionPlan {
        total_risk: round3(actions.iter().map(|a| a.risk).sum()),
        expected_gain: round3(actions.iter().map(|a| a.expected_benefit).sum()),
        actions,
        priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::OutcomeStats;
    use crate::models::SmellType;

    fn smell(t: SmellType, node: &str, severity: f64) -> ArchSmell {
        ArchSmell {
            smell_type: t,
            nodes: vec![node.into()],
            severity,
            description: String::new(),
        }
    }

    fn scored(name: &str) -> ScoredModule {
        ScoredModule {
            name: name.into(),
            score: 1.0,
            reasons: vec![],
        }
    }

    #[test]
    fn test_architecture_plan_steps() {
        let smells = vec![
            smell(SmellType::Hub, "main.py", 9.0),
            smell(SmellType::Bottleneck, "util.py", 4.0),
        ];
        let plan = build_architecture_plan(
            ".",
            &[scored("main.py"), scored("clean.py"), scored("util.py")],
            &smells,
            GeneratedFrom::default(),
        );
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].id, "STEP-001");
        assert_eq!(plan.steps[0].kind, StepKind::SplitModule);
        assert_eq!(
            plan.steps[0].rationale,
            "Module main.py is prioritized due to: hub (severity=9.00)"
        );
        // priority keeps the rank, id keeps the step count
        assert_eq!(plan.steps[1].id, "STEP-002");
        assert_eq!(plan.steps[1].priority, 3);
        assert_eq!(plan.steps[1].smell_type.as_deref(), Some("bottleneck"));
    }

    #[test]
    fn test_action_plan_risk_and_benefit() {
        let smells = vec![
            smell(SmellType::Hub, "main.py", 9.0),
            smell(SmellType::Bottleneck, "util.py", 4.0),
        ];
        let plan = build_architecture_plan(
            ".",
            &[scored("main.py"), scored("util.py")],
            &smells,
            GeneratedFrom::default(),
        );
        let actions = build_action_plan(&plan, None);
        assert_eq!(actions.actions[0].action_type, ActionKind::RefactorModule);
        assert_eq!(actions.actions[0].risk, 0.5);
        assert_eq!(actions.actions[0].expected_benefit, 1.0);
        assert_eq!(actions.actions[1].risk, 0.4);
        assert_eq!(actions.actions[1].expected_benefit, 0.9);
        assert_eq!(actions.total_risk, 0.9);
        assert_eq!(actions.expected_gain, 1.9);
        assert_eq!(actions.priority[1].action_id, "STEP-002");
    }

    #[test]
    fn test_learning_bump() {
        let smells = vec![
            smell(SmellType::Hub, "a.py", 9.0),
            smell(SmellType::Bottleneck, "b.py", 4.0),
        ];
        let plan = build_architecture_plan(
            ".",
            &[scored("a.py"), scored("b.py")],
            &smells,
            GeneratedFrom::default(),
        );
        let mut stats = LearningStats::new();
        stats.insert(
            "bottleneck|introduce_facade".into(),
            OutcomeStats {
                total: 2,
                success: 1,
                ..Default::default()
            },
        );
        let actions = build_action_plan(&plan, Some(&stats));
        assert_eq!(actions.actions[1].expected_benefit, 0.95);
        // capped at 1.0
        assert_eq!(actions.actions[0].expected_benefit, 1.0);
    }
}
