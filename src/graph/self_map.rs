//! Self-map: the scanner's view of a project
//!
//! A self-map lists every Python module with its size and top-level
//! definitions, plus the raw dotted imports of each file. The graph model is
//! built from it, and it round-trips through JSON so a scan can be saved and
//! replayed.

use crate::error::{ArchError, ArchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One scanned Python file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub path: String,
    #[serde(default)]
    pub lines: usize,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Scan output consumed by [`super::ProjectGraph::from_self_map`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfMap {
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// Source path -> dotted module names it imports
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl SelfMap {
    pub fn from_json(content: &str) -> ArchResult<Self> {
        serde_json::from_str(content).map_err(|e| ArchError::SelfMap(e.to_string()))
    }

    pub fn load(path: &Path) -> ArchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ArchError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> ArchResult<()> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ArchError::SelfMap(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ArchError::io(path, e))
    }

    /// Dotted imports recorded for `path`
    pub fn imports_of(&self, path: &str) -> &[String] {
        self.dependencies
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_lines(&self) -> usize {
        self.modules.iter().map(|m| m.lines).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let map = SelfMap::from_json(r#"{"modules": [{"path": "a.py"}]}"#).unwrap();
        assert_eq!(map.modules[0].lines, 0);
        assert!(map.dependencies.is_empty());
        assert!(map.imports_of("a.py").is_empty());
    }

    #[test]
    fn test_from_json_invalid() {
        let err = SelfMap::from_json("[1, 2").unwrap_err();
        assert!(matches!(err, ArchError::SelfMap(_)));
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("self_map.json");
        let mut map = SelfMap::default();
        map.modules.push(ModuleEntry {
            path: "a.py".into(),
            lines: 3,
            functions: vec!["f".into()],
            classes: vec![],
        });
        map.dependencies.insert("a.py".into(), vec!["b".into()]);
        map.save(&path).unwrap();
        assert_eq!(SelfMap::load(&path).unwrap(), map);
        assert_eq!(map.total_lines(), 3);
    }
}
