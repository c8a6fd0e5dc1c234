//! Patch plan synthesis
//!
//! Ranked targets become concrete [`PatchOperation`]s:
//!
//! ```text
//!   targets_from_graph ──► per target (rank order)
//!                            ├─ cycle member?      remove_cyclic_import (claims the cycle)
//!                            ├─ infrastructure?    nothing
//!                            ├─ god_module split?  extract_class (static-like methods)
//!                            └─ generic            TODO block + graph hints + params
//!                                    │
//!                                    ▼
//!                     marker / learning / denylist filters
//!                                    │
//!                                    ▼
//!                        reorder by success rate
//! ```

pub mod action_plan;
pub mod graph_ops;
pub mod learning;
pub mod rules;

pub use action_plan::{
    build_action_plan, build_architecture_plan, ActionPlan, ArchitecturePlan, GeneratedFrom,
    PlanStep,
};

use crate::graph::self_map::SelfMap;
use crate::graph::ProjectGraph;
use crate::history::Trends;
use crate::learning::LearningStats;
use crate::models::{
    file_name, path_stem, ActionKind, ArchSmell, OpParams, PatchOperation, PatchPlan, SmellType,
};
use crate::python::{extracted_sibling, remove_unused_imports, PyModule, EXTRACTED_SUFFIX};
use crate::scoring::{targets_from_graph, PlanTarget, DEFAULT_TOP_N};
use action_plan::dominant_smell;
use graph_ops::{
    graph_hints_for_smell, resolve_module_for_edge, suggest_cycle_break_edge,
    suggest_facade_candidates, suggest_god_module_split_hint,
};
use learning::{apply_smell_action_filters, render_todo_diff, sort_and_reindex_by_learning};
use rules::{diff_hints_for, is_infrastructure_module, StepKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

const HINT_TOP_N: usize = 5;

/// `[planner]` section of `archfix.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub top_n: usize,
    /// `smell|action` pairs never emitted
    pub disabled_smell_actions: Vec<String>,
    /// Also propose removal of unused imports across the project
    pub clean_imports: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            disabled_smell_actions: Vec::new(),
            clean_imports: false,
        }
    }
}

/// Everything the planner reads
pub struct PlannerInputs<'a> {
    pub project_root: &'a Path,
    pub graph: &'a ProjectGraph,
    /// Needed to resolve which import to remove when breaking a cycle
    pub self_map: Option<&'a SelfMap>,
    pub smells: &'a [ArchSmell],
    pub summary_risks: &'a [String],
    pub trends: Trends,
    pub learning: Option<&'a LearningStats>,
    pub config: &'a PlannerConfig,
}

enum CycleBreak {
    Emitted(PatchOperation),
    AlreadyClaimed,
    Unavailable,
}

struct TargetContext<'a, 'b> {
    inputs: &'b PlannerInputs<'a>,
    smells_by_node: BTreeMap<&'a str, Vec<&'a ArchSmell>>,
    claimed_cycles: Vec<BTreeSet<String>>,
}

pub fn build_patch_plan(inputs: &PlannerInputs) -> PatchPlan {
    let targets = targets_from_graph(
        inputs.graph,
        inputs.smells,
        inputs.summary_risks,
        &inputs.trends,
        inputs.config.top_n,
    );

    let mut smells_by_node: BTreeMap<&str, Vec<&ArchSmell>> = BTreeMap::new();
    for smell in inputs.smells {
        for node in &smell.nodes {
            smells_by_node.entry(node.as_str()).or_default().push(smell);
        }
    }
    let mut ctx = TargetContext {
        inputs,
        smells_by_node,
        claimed_cycles: Vec::new(),
    };

    let mut operations = Vec::new();
    for (idx, target) in targets.iter().enumerate() {
        operations.extend(ctx.operations_for_target(idx + 1, target));
    }
    if inputs.config.clean_imports {
        operations.extend(clean_import_operations(inputs));
    }

    let operations = apply_smell_action_filters(
        inputs.project_root,
        operations,
        inputs.learning,
        &inputs.config.disabled_smell_actions,
    );
    let operations = sort_and_reindex_by_learning(operations, inputs.learning);
    info!(
        "Built patch plan with {} operations from {} targets",
        operations.len(),
        targets.len()
    );
    PatchPlan::new(inputs.project_root.display().to_string(), operations)
}

impl<'a, 'b> TargetContext<'a, 'b> {
    fn operations_for_target(&mut self, idx: usize, target: &PlanTarget) -> Vec<PatchOperation> {
        let name = target.name.as_str();
        if name.is_empty() {
            return Vec::new();
        }
        let node_smells: Vec<&ArchSmell> = self.smells_by_node.get(name).cloned().unwrap_or_default();
        let kind = match target.kind {
            StepKind::RefactorModule => {
                let types: Vec<SmellType> = node_smells.iter().map(|s| s.smell_type).collect();
                rules::refactor_kind_for_smells(&types)
            }
            kind => kind,
        };
        let action_kind = kind.action_kind();
        let smell_type = dominant_smell(&node_smells)
            .map(|s| s.smell_type.as_str())
            .unwrap_or("unknown");

        if smell_type == SmellType::CyclicDependency.as_str() {
            match self.cycle_break(&node_smells) {
                CycleBreak::Emitted(op) => return vec![op],
                CycleBreak::AlreadyClaimed => {
                    debug!("{} belongs to an already broken cycle", name);
                }
                CycleBreak::Unavailable => {}
            }
        }
        if is_infrastructure_module(name)
            && matches!(action_kind, ActionKind::SplitModule | ActionKind::RefactorModule)
        {
            return Vec::new();
        }

        let root = self.inputs.project_root;
        let module = PyModule::read(&root.join(name)).ok();
        if action_kind == ActionKind::SplitModule && module.as_ref().is_some_and(PyModule::is_facade) {
            debug!("{} is a facade module; not splitting", name);
            return Vec::new();
        }

        let mut operations = Vec::new();
        if smell_type == SmellType::GodModule.as_str() && action_kind == ActionKind::SplitModule {
            if let Some(op) = module
                .as_ref()
                .and_then(|m| extract_class_operation(root, name, idx, m))
            {
                operations.push(op);
            }
        }

        let (hints, params) = self.hints_and_params(smell_type, action_kind, &node_smells, name, module.as_ref());
        let mut description =
            format!("[{}] Refactor module {} based on detected architecture smells.", idx, name);
        if !target.reasons.is_empty() {
            description.push_str(&format!(" Reasons: {}", target.reasons.join(", ")));
        }
        operations.push(PatchOperation {
            target_file: name.to_string(),
            kind: action_kind,
            description,
            diff: render_todo_diff(name, smell_type, action_kind, &hints),
            smell_type: Some(smell_type.to_string()),
            params,
        });
        operations
    }

    fn cycle_break(&mut self, node_smells: &[&ArchSmell]) -> CycleBreak {
        let Some(self_map) = self.inputs.self_map else {
            return CycleBreak::Unavailable;
        };
        let Some(smell) = node_smells
            .iter()
            .find(|s| s.smell_type == SmellType::CyclicDependency)
        else {
            return CycleBreak::Unavailable;
        };
        let members: BTreeSet<String> = smell.nodes.iter().cloned().collect();
        if self.claimed_cycles.contains(&members) {
            return CycleBreak::AlreadyClaimed;
        }
        let Some((src, dst)) = suggest_cycle_break_edge(self.inputs.graph, &smell.nodes) else {
            return CycleBreak::Unavailable;
        };
        let Some(target_module) = resolve_module_for_edge(self_map, &src, &dst) else {
            return CycleBreak::Unavailable;
        };
        self.claimed_cycles.push(members);
        CycleBreak::Emitted(PatchOperation {
            description: format!("Remove import of {} from {} to break cycle.", target_module, src),
            target_file: src,
            kind: ActionKind::RemoveCyclicImport,
            diff: "# Removed import to break cyclic dependency.".to_string(),
            smell_type: Some(SmellType::CyclicDependency.to_string()),
            params: Some(OpParams {
                target_module: Some(target_module),
                ..Default::default()
            }),
        })
    }

    fn hints_and_params(
        &self,
        smell_type: &str,
        action_kind: ActionKind,
        node_smells: &[&ArchSmell],
        name: &str,
        module: Option<&PyModule>,
    ) -> (Vec<String>, Option<OpParams>) {
        let graph = self.inputs.graph;
        let mut hints: Vec<String> = diff_hints_for(smell_type, action_kind)
            .iter()
            .map(|h| h.to_string())
            .collect();
        for smell in node_smells {
            for hint in graph_hints_for_smell(graph, smell.smell_type.as_str(), &smell.nodes) {
                if !hints.contains(&hint) {
                    hints.push(hint);
                }
            }
        }

        let params = match action_kind {
            ActionKind::SplitModule => {
                let info = suggest_god_module_split_hint(graph, name, HINT_TOP_N);
                let imports_from = match module {
                    Some(m) => m.clean_split_targets(&info.imports_from),
                    None => info.imports_from,
                };
                Some(OpParams {
                    imports_from: Some(imports_from),
                    imported_by: Some(info.imported_by),
                    ..Default::default()
                })
            }
            ActionKind::IntroduceFacade => {
                let callers = suggest_facade_candidates(graph, name, HINT_TOP_N);
                (!callers.is_empty()).then(|| OpParams {
                    callers: Some(callers),
                    ..Default::default()
                })
            }
            _ => None,
        };
        (hints, params)
    }
}

fn extract_class_operation(
    root: &Path,
    name: &str,
    idx: usize,
    module: &PyModule,
) -> Option<PatchOperation> {
    let (class_name, methods) = module.suggest_extract_class()?;
    if extracted_class_is_synced(root, name, module, &class_name, &methods) {
        debug!("{}Extracted already in sync for {}", class_name, name);
        return None;
    }
    let more = if methods.len() > 5 { "..." } else { "" };
    let shown: Vec<&str> = methods.iter().take(5).map(String::as_str).collect();
    Some(PatchOperation {
        target_file: name.to_string(),
        kind: ActionKind::ExtractClass,
        description: format!(
            "[{}] Extract class {} from {} ({} static-like methods).",
            idx,
            class_name,
            name,
            methods.len()
        ),
        diff: format!(
            "# TODO: Extract class {}\n# Methods to extract: {}{}\n",
            class_name,
            shown.join(", "),
            more
        ),
        smell_type: Some("god_class".to_string()),
        params: Some(OpParams {
            target_class: Some(class_name),
            methods_to_extract: Some(methods),
            ..Default::default()
        }),
    })
}

/// The sibling `<Class>Extracted` already holds every required method
///
/// Methods that are `@staticmethod` in the source are not required, unless
/// that would leave nothing to check.
pub fn extracted_class_is_synced(
    root: &Path,
    target_file: &str,
    source: &PyModule,
    target_class: &str,
    methods: &[String],
) -> bool {
    let (sibling, _) = extracted_sibling(target_file, target_class);
    let Ok(extracted) = PyModule::read(&root.join(&sibling)) else {
        return false;
    };
    let static_in_source: BTreeSet<String> = source
        .classes()
        .into_iter()
        .find(|c| c.name == target_class)
        .map(|c| {
            c.methods
                .into_iter()
                .filter(|m| m.is_static)
                .map(|m| m.name)
                .collect()
        })
        .unwrap_or_default();
    let mut required: BTreeSet<&String> = methods
        .iter()
        .filter(|m| !static_in_source.contains(*m))
        .collect();
    if required.is_empty() {
        required = methods.iter().collect();
    }
    let new_class = format!("{}{}", target_class, EXTRACTED_SUFFIX);
    extracted
        .classes()
        .into_iter()
        .find(|c| c.name == new_class)
        .is_some_and(|c| {
            let existing: BTreeSet<&String> = c.methods.iter().map(|m| &m.name).collect();
            required.iter().all(|m| existing.contains(m))
        })
}

/// `remove_unused_import` for every module with dead imports
///
/// Package `__init__.py` files and `*_api.py` modules re-export by
/// importing, so they are left alone.
fn clean_import_operations(inputs: &PlannerInputs) -> Vec<PatchOperation> {
    let Some(self_map) = inputs.self_map else {
        return Vec::new();
    };
    self_map
        .modules
        .iter()
        .map(|m| m.path.as_str())
        .filter(|p| file_name(p) != "__init__.py" && !path_stem(p).ends_with("_api"))
        .filter_map(|path| {
            let source = std::fs::read_to_string(inputs.project_root.join(path)).ok()?;
            remove_unused_imports(&source)?;
            Some(PatchOperation {
                target_file: path.to_string(),
                kind: ActionKind::RemoveUnusedImport,
                description: format!("Remove unused imports from {}.", path),
                diff: "# Removed unused imports.".to_string(),
                smell_type: None,
                params: None,
            })
        })
        .collect()
}
