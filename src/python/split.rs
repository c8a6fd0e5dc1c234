//! Moving top-level definitions into a sibling module, and facade generation
//!
//! A split only moves definitions that are self-contained: everything they
//! read is either an import (copied along), an upper-case constant (copied
//! along) or another definition moving with them. The original module keeps
//! its public surface through an import of the moved names.

use super::edit::{
    apply_edits, import_insertion_point, line_end_inclusive, line_start, module_dependencies, Edit,
};
use super::{names_used_in, statement_count, text, unwrap_definition, visit, PyModule};
use crate::models::path_stem;
use std::collections::HashSet;
use tree_sitter::Node;

/// Suffix of the sibling module that receives split-off definitions
pub const SPLIT_MODULE_SUFFIX: &str = "_extracted";

/// Minimum methods before a class is moved on its own
pub const MIN_SPLIT_CLASS_METHODS: usize = 3;

/// Minimum body statements before a function is moved on its own
pub const MIN_SPLIT_FUNCTION_STATEMENTS: usize = 1;

/// Suffix of a generated facade module
pub const FACADE_SUFFIX: &str = "_api";

/// How a split chose what to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Definitions that only use one hinted import
    ByImport,
    /// The largest movable class
    ByClass,
    /// The largest movable function
    ByFunction,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::ByImport => "by_import",
            SplitStrategy::ByClass => "by_class",
            SplitStrategy::ByFunction => "by_function",
        }
    }
}

/// Result of moving definitions out of a module
#[derive(Debug, Clone)]
pub struct SplitModule {
    pub strategy: SplitStrategy,
    pub new_rel_path: String,
    pub new_content: String,
    pub modified_original: String,
    pub moved: Vec<String>,
}

/// A generated re-export module
#[derive(Debug, Clone)]
pub struct Facade {
    pub new_rel_path: String,
    pub new_content: String,
    pub names: Vec<String>,
}

struct TopDef<'t> {
    outer: Node<'t>,
    def: Node<'t>,
    name: String,
}

fn top_level_defs(module: &PyModule) -> Vec<TopDef<'_>> {
    let src = module.source();
    let root = module.root();
    let mut cursor = root.walk();
    let defs = root
        .named_children(&mut cursor)
        .filter_map(|outer| {
            let def = unwrap_definition(outer);
            if !matches!(def.kind(), "function_definition" | "class_definition") {
                return None;
            }
            let name = text(def.child_by_field_name("name")?, src).to_string();
            Some(TopDef { outer, def, name })
        })
        .collect();
    defs
}

/// Names bound at module level by anything other than an import
fn module_bindings(module: &PyModule) -> HashSet<String> {
    let src = module.source();
    let mut out = HashSet::new();
    visit(module.root(), &mut |n| match n.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name) = n.child_by_field_name("name") {
                out.insert(text(name, src).to_string());
            }
            false
        }
        "assignment" | "augmented_assignment" | "for_statement" => {
            if let Some(left) = n.child_by_field_name("left") {
                visit(left, &mut |id| {
                    if id.kind() == "identifier" {
                        out.insert(text(id, src).to_string());
                    }
                    true
                });
            }
            true
        }
        _ => true,
    });
    out
}

/// Upper-case module-level assignments that read no other module binding
fn copyable_constants(module: &PyModule, bindings: &HashSet<String>) -> HashSet<String> {
    let src = module.source();
    let root = module.root();
    let mut out = HashSet::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let Some(assign) = child
            .named_child(0)
            .filter(|a| child.kind() == "expression_statement" && a.kind() == "assignment")
        else {
            continue;
        };
        let Some(left) = assign.child_by_field_name("left").filter(|l| l.kind() == "identifier")
        else {
            continue;
        };
        let name = text(left, src);
        let is_constant = name.chars().any(|c| c.is_ascii_uppercase())
            && !name.chars().any(|c| c.is_ascii_lowercase());
        let reads_bindings = assign
            .child_by_field_name("right")
            .is_some_and(|r| names_used_in(r, src).iter().any(|n| bindings.contains(n)));
        if is_constant && !reads_bindings {
            out.insert(name.to_string());
        }
    }
    out
}

/// Module context shared by every split strategy
struct SplitContext<'m> {
    module: &'m PyModule,
    defs: Vec<TopDef<'m>>,
    bindings: HashSet<String>,
    constants: HashSet<String>,
}

impl<'m> SplitContext<'m> {
    fn new(module: &'m PyModule, target_file: &str) -> Option<Self> {
        if module.has_errors() || path_stem(target_file) == "__init__" {
            return None;
        }
        let bindings = module_bindings(module);
        let constants = copyable_constants(module, &bindings);
        Some(Self {
            module,
            defs: top_level_defs(module),
            bindings,
            constants,
        })
    }

    /// Whether `def` reads only imports, constants and names in `moving`
    fn is_self_contained(&self, def: &TopDef, moving: &HashSet<&str>) -> bool {
        names_used_in(def.outer, self.module.source())
            .iter()
            .all(|n| {
                !self.bindings.contains(n)
                    || self.constants.contains(n)
                    || moving.contains(n.as_str())
            })
    }

    /// Largest movable definition of one kind; ties go to the earliest
    fn largest(&self, kind: &str, size: impl Fn(Node) -> usize, min: usize) -> Option<&TopDef<'m>> {
        if self.defs.len() < 2 {
            return None;
        }
        let mut best: Option<(&TopDef, usize)> = None;
        for def in self.defs.iter().filter(|d| d.def.kind() == kind) {
            let n = size(def.def);
            let moving = HashSet::from([def.name.as_str()]);
            if n < min || !self.is_self_contained(def, &moving) {
                continue;
            }
            if best.map_or(true, |(_, b)| n > b) {
                best = Some((def, n));
            }
        }
        best.map(|(d, _)| d)
    }

    fn build(&self, target_file: &str, strategy: SplitStrategy, chosen: &[&TopDef]) -> SplitModule {
        let src = self.module.source();
        let without_ext = target_file.strip_suffix(".py").unwrap_or(target_file);
        let new_rel_path = format!("{}{}.py", without_ext, SPLIT_MODULE_SUFFIX);
        let module_path = format!("{}{}", without_ext.replace('/', "."), SPLIT_MODULE_SUFFIX);

        let mut used = HashSet::new();
        let mut blocks = Vec::new();
        let mut edits = Vec::new();
        for def in chosen {
            used.extend(names_used_in(def.outer, src));
            blocks.push(text(def.outer, src).to_string());
            let start = line_start(src, def.outer.start_byte());
            let mut end = line_end_inclusive(src, def.outer.end_byte());
            // blank lines after the definition go with it
            while end < src.len() {
                let next = line_end_inclusive(src, end);
                if !src[end..next].trim().is_empty() {
                    break;
                }
                end = next;
            }
            edits.push(Edit {
                start,
                end,
                replacement: String::new(),
            });
        }
        let moved: Vec<String> = chosen.iter().map(|d| d.name.clone()).collect();
        let insert_at = import_insertion_point(self.module);
        edits.push(Edit {
            start: insert_at,
            end: insert_at,
            replacement: format!("from {} import {}\n", module_path, moved.join(", ")),
        });

        let mut lines = vec![
            "\"\"\"Extracted from parent module to reduce complexity.\"\"\"".to_string(),
            String::new(),
        ];
        let deps = module_dependencies(self.module, &used);
        if !deps.is_empty() {
            lines.extend(deps);
            lines.push(String::new());
            lines.push(String::new());
        }
        lines.push(blocks.join("\n\n\n"));
        let new_content = format!("{}\n", lines.join("\n").trim_end());

        let mut modified_original = apply_edits(src, edits);
        if !modified_original.ends_with('\n') {
            modified_original.push('\n');
        }
        SplitModule {
            strategy,
            new_rel_path,
            new_content,
            modified_original,
            moved,
        }
    }
}

/// Move the definitions that depend on a single hinted import
///
/// `imports_from` holds module paths the file imports (from graph edges);
/// their stems are matched against the file's import bindings. The stem
/// with the most movable definitions wins.
pub fn split_module_by_import(
    source: &str,
    target_file: &str,
    imports_from: &[String],
) -> Option<SplitModule> {
    let module = PyModule::parse(source).ok()?;
    let ctx = SplitContext::new(&module, target_file)?;
    let hinted: HashSet<&str> = imports_from
        .iter()
        .map(|p| path_stem(p))
        .filter(|s| !s.is_empty() && *s != "__init__")
        .collect();
    if hinted.is_empty() {
        return None;
    }

    let mut binding_stems: Vec<(String, Vec<String>)> = Vec::new();
    for stmt in module.imports() {
        binding_stems.extend(stmt.stems_by_binding());
    }

    let src = module.source();
    let mut by_stem: Vec<(String, Vec<&TopDef>)> = Vec::new();
    for def in &ctx.defs {
        let mut relevant = HashSet::new();
        let mut others = false;
        for name in names_used_in(def.outer, src) {
            for (_, stems) in binding_stems.iter().filter(|(b, _)| *b == name) {
                match stems.iter().find(|s| hinted.contains(s.as_str())) {
                    Some(stem) => {
                        relevant.insert(stem.clone());
                    }
                    None => others = true,
                }
            }
        }
        if others || relevant.len() != 1 {
            continue;
        }
        let Some(stem) = relevant.into_iter().next() else {
            continue;
        };
        match by_stem.iter_mut().find(|(s, _)| *s == stem) {
            Some((_, defs)) => defs.push(def),
            None => by_stem.push((stem, vec![def])),
        }
    }

    // a candidate that reads a definition staying behind cannot move
    for (_, defs) in by_stem.iter_mut() {
        loop {
            let names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();
            let moving: HashSet<&str> = names.iter().map(String::as_str).collect();
            let before = defs.len();
            defs.retain(|d| ctx.is_self_contained(d, &moving));
            if defs.len() == before {
                break;
            }
        }
    }

    let mut best: Option<&Vec<&TopDef>> = None;
    for (_, defs) in &by_stem {
        if !defs.is_empty() && best.map_or(true, |b| defs.len() > b.len()) {
            best = Some(defs);
        }
    }
    let chosen = best?;
    Some(ctx.build(target_file, SplitStrategy::ByImport, chosen))
}

/// Move the largest self-contained class with at least `min_methods` methods
pub fn split_module_by_class(
    source: &str,
    target_file: &str,
    min_methods: usize,
) -> Option<SplitModule> {
    let module = PyModule::parse(source).ok()?;
    let ctx = SplitContext::new(&module, target_file)?;
    let method_count = |class: Node| {
        class.child_by_field_name("body").map_or(0, |body| {
            let mut cursor = body.walk();
            let methods = body
                .named_children(&mut cursor)
                .filter(|c| unwrap_definition(*c).kind() == "function_definition")
                .count();
            methods
        })
    };
    let def = ctx.largest("class_definition", method_count, min_methods)?;
    Some(ctx.build(target_file, SplitStrategy::ByClass, &[def]))
}

/// Move the largest self-contained function with at least `min_statements`
/// body statements
pub fn split_module_by_function(
    source: &str,
    target_file: &str,
    min_statements: usize,
) -> Option<SplitModule> {
    let module = PyModule::parse(source).ok()?;
    let ctx = SplitContext::new(&module, target_file)?;
    let body_size = |func: Node| func.child_by_field_name("body").map_or(0, statement_count);
    let def = ctx.largest("function_definition", body_size, min_statements)?;
    Some(ctx.build(target_file, SplitStrategy::ByFunction, &[def]))
}

/// Try each split strategy in turn: by import, by class, by function
pub fn split_module(source: &str, target_file: &str, imports_from: &[String]) -> Option<SplitModule> {
    split_module_by_import(source, target_file, imports_from)
        .or_else(|| split_module_by_class(source, target_file, MIN_SPLIT_CLASS_METHODS))
        .or_else(|| split_module_by_function(source, target_file, MIN_SPLIT_FUNCTION_STATEMENTS))
}

/// Entries of a module-level `__all__`, in order, if the module defines one
fn ordered_exports(module: &PyModule) -> Option<Vec<String>> {
    let src = module.source();
    let root = module.root();
    let mut cursor = root.walk();
    let assign = root.named_children(&mut cursor).find_map(|child| {
        child
            .named_child(0)
            .filter(|a| child.kind() == "expression_statement" && a.kind() == "assignment")
            .filter(|a| {
                a.child_by_field_name("left")
                    .is_some_and(|l| text(l, src) == "__all__")
            })
    })?;
    let mut names: Vec<String> = Vec::new();
    if let Some(right) = assign.child_by_field_name("right") {
        visit(right, &mut |n| {
            if n.kind() == "string_content" {
                let name = text(n, src).to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            true
        });
    }
    Some(names)
}

/// Build a `<stem>_api.py` module re-exporting the public names of a module
///
/// Public names come from `__all__` when present, otherwise from top-level
/// functions and classes without a leading underscore. Returns `None` for
/// facades themselves, package `__init__` files and modules with nothing
/// public.
pub fn introduce_facade(source: &str, target_file: &str, callers: &[String]) -> Option<Facade> {
    let module = PyModule::parse(source).ok()?;
    if module.has_errors() {
        return None;
    }
    let stem = path_stem(target_file);
    if stem.ends_with(FACADE_SUFFIX) || stem == "__init__" {
        return None;
    }
    let names = ordered_exports(&module).unwrap_or_else(|| {
        top_level_defs(&module)
            .into_iter()
            .map(|d| d.name)
            .filter(|n| !n.starts_with('_'))
            .collect()
    });
    if names.is_empty() {
        return None;
    }

    let without_ext = target_file.strip_suffix(".py").unwrap_or(target_file);
    let callers_note = if callers.is_empty() {
        String::new()
    } else {
        let shown: Vec<&str> = callers.iter().take(5).map(String::as_str).collect();
        let more = if callers.len() > 5 { "..." } else { "" };
        format!("\n\nCallers (candidates to switch): {}{}", shown.join(", "), more)
    };
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    let new_content = format!(
        "\"\"\"Facade for {}: stable API boundary.{}\"\"\"\n\nfrom {} import {}\n\n__all__ = [{}]\n",
        stem,
        callers_note,
        without_ext.replace('/', "."),
        names.join(", "),
        quoted.join(", "),
    );
    Some(Facade {
        new_rel_path: format!("{}{}.py", without_ext, FACADE_SUFFIX),
        new_content,
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_by_import_moves_single_import_users() {
        let src = "\
import json
import os


def dump(x):
    return json.dumps(x)


def load(s):
    return json.loads(s)


def cwd():
    return os.getcwd()
";
        let split = split_module_by_import(src, "pkg/core.py", &["json.py".to_string()])
            .expect("json users split off");
        assert_eq!(split.strategy, SplitStrategy::ByImport);
        assert_eq!(split.new_rel_path, "pkg/core_extracted.py");
        assert_eq!(split.moved, vec!["dump", "load"]);
        assert!(split.new_content.starts_with("\"\"\"Extracted from parent module"));
        assert!(split.new_content.contains("import json\n"));
        assert!(!split.new_content.contains("import os"));
        assert!(split.new_content.contains("def load(s):"));
        assert!(split
            .modified_original
            .contains("from pkg.core_extracted import dump, load\n"));
        assert!(!split.modified_original.contains("def dump"));
        assert!(split.modified_original.contains("def cwd():"));
        assert!(!PyModule::parse(split.modified_original.as_str())
            .expect("parses")
            .has_errors());
    }

    #[test]
    fn test_split_by_import_needs_a_matching_hint() {
        let src = "import json\n\n\ndef dump(x):\n    return json.dumps(x)\n";
        assert!(split_module_by_import(src, "core.py", &[]).is_none());
        assert!(split_module_by_import(src, "core.py", &["yaml.py".to_string()]).is_none());
    }

    #[test]
    fn test_split_skips_definitions_that_read_local_helpers() {
        let src = "\
import json

_cache = {}


def helper():
    return 1


def dump(x):
    return json.dumps(x) + str(helper())


def remember(x):
    _cache[x] = json.dumps(x)
";
        assert!(split_module_by_import(src, "core.py", &["json.py".to_string()]).is_none());
    }

    #[test]
    fn test_split_by_class_picks_largest_movable_class() {
        let src = "\
LIMIT = 3


class Small:
    def a(self):
        return 1


class Big:
    def a(self):
        return LIMIT

    def b(self):
        return 2

    def c(self):
        return 3
";
        let split = split_module_by_class(src, "shapes.py", MIN_SPLIT_CLASS_METHODS)
            .expect("class moved");
        assert_eq!(split.moved, vec!["Big"]);
        assert_eq!(split.new_rel_path, "shapes_extracted.py");
        assert!(split.new_content.contains("LIMIT = 3\n"));
        assert!(split.new_content.contains("class Big:"));
        assert!(split.modified_original.contains("from shapes_extracted import Big\n"));
        assert!(split.modified_original.contains("class Small:"));
        assert!(!split.modified_original.contains("class Big"));
    }

    #[test]
    fn test_split_by_function_needs_a_second_definition() {
        let lone = "def only():\n    return 1\n";
        assert!(split_module_by_function(lone, "m.py", 1).is_none());

        let src = "def short():\n    pass\n\n\ndef longer():\n    x = 1\n    return x\n";
        let split = split_module_by_function(src, "m.py", 1).expect("function moved");
        assert_eq!(split.moved, vec!["longer"]);
        assert_eq!(
            split.modified_original,
            "from m_extracted import longer\ndef short():\n    pass\n\n\n"
        );
    }

    #[test]
    fn test_split_chain_falls_through_strategies() {
        let src = "def a():\n    return 1\n\n\ndef b():\n    return 2\n";
        let split = split_module(src, "m.py", &["json.py".to_string()]).expect("split");
        assert_eq!(split.strategy, SplitStrategy::ByFunction);
        assert!(split_module("x = 1\n", "m.py", &[]).is_none());
        assert!(split_module(src, "pkg/__init__.py", &[]).is_none());
    }

    #[test]
    fn test_introduce_facade_uses_public_definitions() {
        let src = "def run():\n    pass\n\n\ndef _private():\n    pass\n\n\nclass Engine:\n    pass\n";
        let facade = introduce_facade(src, "pkg/engine.py", &["a.py".to_string()])
            .expect("facade built");
        assert_eq!(facade.new_rel_path, "pkg/engine_api.py");
        assert_eq!(facade.names, vec!["run", "Engine"]);
        assert_eq!(
            facade.new_content,
            "\"\"\"Facade for engine: stable API boundary.\n\n\
             Callers (candidates to switch): a.py\"\"\"\n\n\
             from pkg.engine import run, Engine\n\n\
             __all__ = ['run', 'Engine']\n"
        );
    }

    #[test]
    fn test_introduce_facade_prefers_all_and_skips_facades() {
        let src = "__all__ = ['b', 'a']\n\n\ndef a():\n    pass\n\n\ndef b():\n    pass\n";
        let facade = introduce_facade(src, "m.py", &[]).expect("facade built");
        assert_eq!(facade.names, vec!["b", "a"]);
        assert!(!facade.new_content.contains("Callers"));

        assert!(introduce_facade(src, "m_api.py", &[]).is_none());
        assert!(introduce_facade("def _x():\n    pass\n", "m.py", &[]).is_none());
    }
}
