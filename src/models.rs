//! Core data models for archfix
//!
//! These types cross every stage boundary: smells produced by the detectors,
//! patch operations produced by the planner, and the risk levels the policy
//! gate assigns to them. All of them serialize to the plain JSON shapes that
//! `archfix plan --output` writes and `archfix apply --plan` reads back.

use crate::error::{ArchError, ArchResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Architectural smell categories found on the import graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmellType {
    GodModule,
    Hub,
    Bottleneck,
    CyclicDependency,
}

impl SmellType {
    pub const ALL: [SmellType; 4] = [
        SmellType::GodModule,
        SmellType::Hub,
        SmellType::Bottleneck,
        SmellType::CyclicDependency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SmellType::GodModule => "god_module",
            SmellType::Hub => "hub",
            SmellType::Bottleneck => "bottleneck",
            SmellType::CyclicDependency => "cyclic_dependency",
        }
    }
}

impl std::fmt::Display for SmellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural finding about the dependency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchSmell {
    #[serde(rename = "type")]
    pub smell_type: SmellType,
    pub nodes: Vec<String>,
    pub severity: f64,
    #[serde(default)]
    pub description: String,
}

/// Kinds of file-level change the planner can propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RemoveUnusedImport,
    RemoveCyclicImport,
    FixImport,
    CreateModuleStub,
    SplitModule,
    ExtractClass,
    ExtractBlockToHelper,
    ExtractNestedFunction,
    RefactorModule,
    IntroduceFacade,
    RefactorDependencies,
    RefactorCodeSmell,
}

impl ActionKind {
    pub const ALL: [ActionKind; 12] = [
        ActionKind::RemoveUnusedImport,
        ActionKind::RemoveCyclicImport,
        ActionKind::FixImport,
        ActionKind::CreateModuleStub,
        ActionKind::SplitModule,
        ActionKind::ExtractClass,
        ActionKind::ExtractBlockToHelper,
        ActionKind::ExtractNestedFunction,
        ActionKind::RefactorModule,
        ActionKind::IntroduceFacade,
        ActionKind::RefactorDependencies,
        ActionKind::RefactorCodeSmell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RemoveUnusedImport => "remove_unused_import",
            ActionKind::RemoveCyclicImport => "remove_cyclic_import",
            ActionKind::FixImport => "fix_import",
            ActionKind::CreateModuleStub => "create_module_stub",
            ActionKind::SplitModule => "split_module",
            ActionKind::ExtractClass => "extract_class",
            ActionKind::ExtractBlockToHelper => "extract_block_to_helper",
            ActionKind::ExtractNestedFunction => "extract_nested_function",
            ActionKind::RefactorModule => "refactor_module",
            ActionKind::IntroduceFacade => "introduce_facade",
            ActionKind::RefactorDependencies => "refactor_dependencies",
            ActionKind::RefactorCodeSmell => "refactor_code_smell",
        }
    }

    /// Whether applying this kind appends a textual TODO block
    pub fn is_append_style(&self) -> bool {
        matches!(
            self,
            ActionKind::RefactorModule | ActionKind::SplitModule | ActionKind::RefactorCodeSmell
        )
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| ArchError::Plan(format!("unknown action kind '{}'", s)))
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk tiers assigned by the policy gate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = ArchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(ArchError::Config(format!("unknown risk level '{}'", other))),
        }
    }
}

/// Structured parameters attached to a patch operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports_from: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods_to_extract: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One proposed file-level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub target_file: String,
    pub kind: ActionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub smell_type: Option<String>,
    #[serde(default)]
    pub params: Option<OpParams>,
}

impl PatchOperation {
    /// `smell|kind` key used by learning statistics and config denylists
    pub fn smell_action_key(&self) -> String {
        format!(
            "{}|{}",
            self.smell_type.as_deref().unwrap_or("unknown"),
            self.kind
        )
    }

    /// `target|kind|location` key used by session memory
    pub fn operation_key(&self) -> String {
        let location = self
            .params
            .as_ref()
            .and_then(|p| p.location.as_deref())
            .unwrap_or("");
        format!("{}|{}|{}", self.target_file, self.kind, location)
    }

    pub fn location(&self) -> Option<&str> {
        self.params.as_ref().and_then(|p| p.location.as_deref())
    }
}

/// An ordered list of operations for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchPlan {
    pub project_root: String,
    #[serde(default)]
    pub operations: Vec<PatchOperation>,
}

impl PatchPlan {
    pub fn new(project_root: impl Into<String>, operations: Vec<PatchOperation>) -> Self {
        Self {
            project_root: project_root.into(),
            operations,
        }
    }

    pub fn from_json(content: &str) -> ArchResult<Self> {
        serde_json::from_str(content).map_err(|e| ArchError::Plan(e.to_string()))
    }

    pub fn load(path: &Path) -> ArchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ArchError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> ArchResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ArchError::io(parent, e))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ArchError::Plan(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ArchError::io(path, e))
    }
}

/// Canonical POSIX-style relative path used for graph nodes and plan targets
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// File stem of a POSIX path (`pkg/mod.py` -> `mod`)
pub fn path_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".py").unwrap_or(name)
}

/// File name of a POSIX path (`pkg/mod.py` -> `mod.py`)
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./pkg\\mod.py"), "pkg/mod.py");
        assert_eq!(normalize_path("a.py"), "a.py");
    }

    #[test]
    fn test_path_stem() {
        assert_eq!(path_stem("pkg/foo_api.py"), "foo_api");
        assert_eq!(path_stem("mod.py"), "mod");
        assert_eq!(file_name("pkg/mod.py"), "mod.py");
    }

    #[test]
    fn test_operation_keys() {
        let op = PatchOperation {
            target_file: "a.py".into(),
            kind: ActionKind::SplitModule,
            description: String::new(),
            diff: String::new(),
            smell_type: Some("hub".into()),
            params: Some(OpParams {
                location: Some("Foo".into()),
                ..Default::default()
            }),
        };
        assert_eq!(op.smell_action_key(), "hub|split_module");
        assert_eq!(op.operation_key(), "a.py|split_module|Foo");
    }

    #[test]
    fn test_plan_json_shape() {
        let json = r#"{"project_root": ".", "operations": [
            {"target_file": "a.py", "kind": "remove_cyclic_import", "description": "d",
             "diff": "", "smell_type": "cyclic_dependency", "params": {"target_module": "b"}}
        ]}"#;
        let plan = PatchPlan::from_json(json).expect("valid plan");
        assert_eq!(plan.operations[0].kind, ActionKind::RemoveCyclicImport);
        assert_eq!(
            plan.operations[0]
                .params
                .as_ref()
                .and_then(|p| p.target_module.as_deref()),
            Some("b")
        );
        assert!(PatchPlan::from_json("{not json").is_err());
    }

    #[test]
    fn test_risk_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!("HIGH".parse::<RiskLevel>().ok(), Some(RiskLevel::High));
        assert!("extreme".parse::<RiskLevel>().is_err());
    }
}
