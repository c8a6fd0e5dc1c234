//! Planner rule tables
//!
//! Static mappings from smells to plan steps and from plan steps to patch
//! operation kinds, plus the canned refactoring hints embedded in diffs.

use crate::models::{file_name, ActionKind, SmellType};
use serde::{Deserialize, Serialize};

/// Separator between smell type and action kind in learning keys
pub const SMELL_ACTION_SEP: &str = "|";

/// Modules of the patching machinery itself; never split or refactored
pub const INFRASTRUCTURE_MODULES: &[&str] = &["patch_engine.py", "patch_apply.py"];

/// Pairs with fewer than this many outcomes are never filtered
pub const MIN_TOTAL_FOR_FILTER: usize = 3;

/// Success rate below which a pair is rebuilt or dropped
pub const MIN_SUCCESS_RATE: f64 = 0.25;

/// High-level plan step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SplitModule,
    IntroduceFacade,
    BreakCycle,
    SplitResponsibility,
    RefactorModule,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::SplitModule => "split_module",
            StepKind::IntroduceFacade => "introduce_facade",
            StepKind::BreakCycle => "break_cycle",
            StepKind::SplitResponsibility => "split_responsibility",
            StepKind::RefactorModule => "refactor_module",
        }
    }

    /// Patch operation kind implementing this step
    pub fn action_kind(&self) -> ActionKind {
        match self {
            StepKind::SplitModule => ActionKind::SplitModule,
            StepKind::IntroduceFacade => ActionKind::IntroduceFacade,
            StepKind::BreakCycle => ActionKind::RefactorDependencies,
            StepKind::SplitResponsibility | StepKind::RefactorModule => ActionKind::RefactorModule,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn step_kind_for_smell(smell_type: SmellType) -> StepKind {
    match smell_type {
        SmellType::GodModule | SmellType::Hub => StepKind::SplitModule,
        SmellType::Bottleneck => StepKind::IntroduceFacade,
        SmellType::CyclicDependency => StepKind::BreakCycle,
    }
}

/// Step kind for a module carrying several smells
///
/// god_module wins over bottleneck, bottleneck over hub, hub over cycles.
pub fn refactor_kind_for_smells(types: &[SmellType]) -> StepKind {
    const PRIORITY: [SmellType; 4] = [
        SmellType::GodModule,
        SmellType::Bottleneck,
        SmellType::Hub,
        SmellType::CyclicDependency,
    ];
    PRIORITY
        .iter()
        .find(|t| types.contains(t))
        .map(|t| step_kind_for_smell(*t))
        .unwrap_or(StepKind::RefactorModule)
}

const GOD_MODULE_HINTS: [&str; 3] = [
    "Extract coherent sub-responsibilities into separate modules (e.g. core, analysis, reporting).",
    "Identify distinct concerns and split this module into focused units.",
    "Reduce total degree (fan-in + fan-out) via extraction.",
];

const GENERIC_HINTS: [&str; 3] = [
    "Split responsibilities or introduce a facade where appropriate.",
    "Reduce excessive fan-in/fan-out.",
    "Align with semantic roles and system topology.",
];

/// (smell, action) -> three canned hints
const DIFF_HINTS: &[(&str, ActionKind, [&str; 3])] = &[
    ("god_module", ActionKind::SplitModule, GOD_MODULE_HINTS),
    ("god_module", ActionKind::RefactorModule, GOD_MODULE_HINTS),
    (
        "bottleneck",
        ActionKind::IntroduceFacade,
        [
            "Introduce a facade or boundary to reduce direct fan-in.",
            "Create a stable public API for this module; let internal structure evolve independently.",
            "Limit the number of modules that import this file directly.",
        ],
    ),
    (
        "hub",
        ActionKind::RefactorModule,
        [
            "Split outgoing dependencies across clearer layers or services.",
            "Introduce intermediate abstractions to decouple from concrete implementations.",
            "Align with semantic roles and system topology.",
        ],
    ),
    (
        "hub",
        ActionKind::SplitModule,
        [
            "Split outgoing dependencies across clearer layers or services.",
            "Extract coherent sub-graphs by domain or layer.",
            "Reduce fan-out via extraction into focused modules.",
        ],
    ),
    (
        "cyclic_dependency",
        ActionKind::RefactorDependencies,
        [
            "Break import cycles via inversion of dependencies or adapters.",
            "Extract shared interfaces; depend on abstractions, not implementations.",
            "Consider introducing a shared-core module used by both sides.",
        ],
    ),
];

/// Canned hints: exact pair, then any entry for the smell, then generic
pub fn diff_hints_for(smell_type: &str, action: ActionKind) -> [&'static str; 3] {
    if let Some((_, _, hints)) = DIFF_HINTS
        .iter()
        .find(|(s, a, _)| *s == smell_type && *a == action)
    {
        return *hints;
    }
    if smell_type != "unknown" {
        if let Some((_, _, hints)) = DIFF_HINTS.iter().find(|(s, _, _)| *s == smell_type) {
            return *hints;
        }
    }
    GENERIC_HINTS
}

/// Safer replacement for a pair with poor history, if one exists
pub fn fallback_kind_for_low_success(smell_type: &str, action: ActionKind) -> Option<ActionKind> {
    match (smell_type, action) {
        ("hub", ActionKind::SplitModule) => Some(ActionKind::RefactorModule),
        _ => None,
    }
}

pub fn is_infrastructure_module(path: &str) -> bool {
    INFRASTRUCTURE_MODULES.contains(&file_name(path))
}

/// Parse a comma-separated `smell|action` list, ignoring malformed entries
pub fn parse_smell_action_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && item.contains(SMELL_ACTION_SEP))
        .map(str::to_string)
        .collect()
}
