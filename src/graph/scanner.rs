//! Project scanner
//!
//! Walks a project directory (respecting .gitignore), parses each Python
//! file with tree-sitter and records its outline and imports in a
//! [`SelfMap`].

use super::self_map::{ModuleEntry, SelfMap};
use crate::error::{ArchError, ArchResult};
use crate::models::normalize_path;
use crate::python::PyModule;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory names never descended into
pub const SKIP_DIRS: &[&str] = &[
    ".venv",
    "venv",
    "__pycache__",
    ".archfix",
    ".archfix_backups",
    ".git",
    "node_modules",
];

/// All `.py` files under `root`, sorted, honoring .gitignore and `exclude`
pub fn python_files(root: &Path, exclude: &[String]) -> Vec<PathBuf> {
    let exclude: Vec<String> = exclude.to_vec();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && (SKIP_DIRS.contains(&name.as_ref()) || exclude.iter().any(|e| e == &name)))
        });

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "py"))
        .collect();
    files.sort();
    files
}

/// Path of `file` relative to `root` in POSIX form
pub fn relative_path(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    normalize_path(&rel.to_string_lossy())
}

/// Build a self-map for the project at `root`
pub fn scan_project(root: &Path, exclude: &[String]) -> ArchResult<SelfMap> {
    if !root.is_dir() {
        return Err(ArchError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "project root is not a directory"),
        ));
    }

    let mut map = SelfMap::default();
    for file in python_files(root, exclude) {
        let rel = relative_path(root, &file);
        let module = match PyModule::read(&file) {
            Ok(module) => module,
            Err(e) => {
                warn!("Skipping {}: {}", rel, e);
                continue;
            }
        };
        if module.has_errors() {
            debug!("{} has syntax errors; outline may be partial", rel);
        }
        let outline = module.outline();
        let imports = module.imported_modules();
        if !imports.is_empty() {
            map.dependencies.insert(rel.clone(), imports);
        }
        map.modules.push(ModuleEntry {
            path: rel,
            lines: outline.lines,
            functions: outline.functions,
            classes: outline.classes,
        });
    }
    map.modules.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        "Scanned {} Python modules ({} lines)",
        map.modules.len(),
        map.total_lines()
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_scan_project() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.py"), "import b\nimport os\n\ndef f():\n    pass\n").unwrap();
        fs::create_dir(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/b.py"), "class B:\n    pass\n").unwrap();
        fs::create_dir(root.join(".venv")).unwrap();
        fs::write(root.join(".venv/skip.py"), "import a\n").unwrap();
        fs::create_dir(root.join("__pycache__")).unwrap();
        fs::write(root.join("__pycache__/x.py"), "").unwrap();

        let map = scan_project(root, &[]).unwrap();
        let paths: Vec<&str> = map.modules.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "pkg/b.py"]);
        assert_eq!(map.modules[0].functions, vec!["f"]);
        assert_eq!(map.modules[1].classes, vec!["B"]);
        assert_eq!(map.imports_of("a.py"), ["b".to_string(), "os".to_string()]);
    }

    #[test]
    fn test_scan_exclude() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/gen.py"), "x = 1\n").unwrap();
        fs::write(dir.path().join("main.py"), "x = 1\n").unwrap();
        let map = scan_project(dir.path(), &["build".to_string()]).unwrap();
        assert_eq!(map.modules.len(), 1);
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_project(&dir.path().join("nope"), &[]).is_err());
    }
}
