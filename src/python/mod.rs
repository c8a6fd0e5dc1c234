//! Python source analysis using tree-sitter
//!
//! Everything the planner and the apply stage need to know about a single
//! Python file: its imports (with byte ranges so they can be edited), which
//! names it reads, its classes and their methods, whether it is a pure
//! re-export facade, and which of its top-level definitions could move out
//! cleanly together with a set of imports. The `edit` and `split` submodules
//! turn that knowledge into rewritten sources.

mod edit;
mod split;

pub use edit::{
    extract_class, extracted_sibling, remove_import, remove_unused_imports, ExtractedClass,
};
pub use split::{
    introduce_facade, split_module, split_module_by_class, split_module_by_function,
    split_module_by_import, Facade, SplitModule, SplitStrategy,
};

use crate::error::{ArchError, ArchResult};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Minimum number of static-like methods before a class is an extraction candidate
pub const MIN_EXTRACTABLE_METHODS: usize = 6;

/// Suffix appended to the class name of an extracted class
pub const EXTRACTED_SUFFIX: &str = "Extracted";

/// A parsed Python module
pub struct PyModule {
    source: String,
    tree: Tree,
}

/// Import statement shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportForm {
    /// `import a.b as c`
    Plain,
    /// `from .a.b import c`; `module` is None for `from . import c`
    From { module: Option<String>, level: usize },
    /// `from __future__ import x`
    Future,
}

/// A single name brought in by an import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

/// One import statement with its location in the source
#[derive(Debug, Clone)]
pub struct ImportStmt {
    pub form: ImportForm,
    pub names: Vec<ImportedName>,
    pub wildcard: bool,
    pub start_byte: usize,
    pub end_byte: usize,
    pub top_level: bool,
    pub type_checking: bool,
    /// Enclosing indented block, `None` at module level
    pub block: Option<BlockRef>,
}

/// The indented block an import sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub start_byte: usize,
    /// Non-comment statements in the block
    pub statements: usize,
}

impl ImportStmt {
    /// Local name bound by `name` under this statement
    pub fn bound_name(&self, name: &ImportedName) -> String {
        if let Some(alias) = &name.alias {
            return alias.clone();
        }
        match self.form {
            ImportForm::Plain => first_segment(&name.name).to_string(),
            _ => name.name.clone(),
        }
    }

    /// Module stems this statement can refer to, for each bound name
    fn stems_by_binding(&self) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        for name in &self.names {
            let mut stems = Vec::new();
            match &self.form {
                ImportForm::Plain => push_segments(&mut stems, &name.name),
                ImportForm::From { module, .. } => {
                    if let Some(module) = module {
                        push_segments(&mut stems, module);
                    }
                    push_segments(&mut stems, &name.name);
                }
                ImportForm::Future => continue,
            }
            out.push((self.bound_name(name), stems));
        }
        out
    }

    /// Render the statement with only the given names
    pub(crate) fn render(&self, names: &[&ImportedName]) -> String {
        let list = names
            .iter()
            .map(|n| match &n.alias {
                Some(alias) => format!("{} as {}", n.name, alias),
                None => n.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        match &self.form {
            ImportForm::Plain => format!("import {}", list),
            ImportForm::From { module, level } => format!(
                "from {}{} import {}",
                ".".repeat(*level),
                module.as_deref().unwrap_or(""),
                list
            ),
            ImportForm::Future => format!("from __future__ import {}", list),
        }
    }
}

fn first_segment(dotted: &str) -> &str {
    dotted.split('.').next().unwrap_or(dotted)
}

fn push_segments(stems: &mut Vec<String>, dotted: &str) {
    let first = first_segment(dotted).to_string();
    let last = dotted.rsplit('.').next().unwrap_or(dotted).to_string();
    if !stems.contains(&first) {
        stems.push(first);
    }
    if !stems.contains(&last) {
        stems.push(last);
    }
}

/// Top-level shape of a module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outline {
    pub lines: usize,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
}

/// A method inside a class body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub uses_self_attrs: bool,
    pub is_static: bool,
    /// Decorated with something other than `@staticmethod`
    pub other_decorators: bool,
}

impl MethodInfo {
    pub fn is_dunder(&self) -> bool {
        self.name.starts_with("__") && self.name.ends_with("__")
    }

    /// Could move to a static helper class without touching instance state
    pub fn is_extractable(&self) -> bool {
        !self.is_dunder() && !self.uses_self_attrs && !self.other_decorators
    }
}

/// A class with its directly defined methods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub methods: Vec<MethodInfo>,
}

pub(crate) fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Depth-first visit; the callback returns false to skip a subtree
pub(crate) fn visit<'t, F>(node: Node<'t>, f: &mut F)
where
    F: FnMut(Node<'t>) -> bool,
{
    if !f(node) {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child, f);
    }
}

fn is_import_kind(kind: &str) -> bool {
    matches!(
        kind,
        "import_statement" | "import_from_statement" | "future_import_statement"
    )
}

/// Function definition behind a possibly decorated definition
pub(crate) fn unwrap_definition(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        if let Some(def) = node.child_by_field_name("definition") {
            return def;
        }
    }
    node
}

fn decorator_names<'a>(node: Node, source: &'a str) -> Vec<&'a str> {
    if node.kind() != "decorated_definition" {
        return Vec::new();
    }
    let mut cursor = node.walk();
    let names = node
        .children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .map(|d| text(d, source).trim_start_matches('@').trim())
        .collect();
    names
}

fn is_type_checking_condition(node: Node, source: &str) -> bool {
    let t = text(node, source);
    t == "TYPE_CHECKING" || t.ends_with(".TYPE_CHECKING")
}

/// Non-comment named statements directly inside a block
fn statement_count(block: Node) -> usize {
    let mut cursor = block.walk();
    let count = block
        .named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .count();
    count
}

impl PyModule {
    pub fn parse(source: impl Into<String>) -> ArchResult<Self> {
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ArchError::Parse(format!("failed to load Python grammar: {}", e)))?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| ArchError::Parse("parser returned no tree".to_string()))?;
        Ok(Self { source, tree })
    }

    pub fn read(path: &Path) -> ArchResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ArchError::io(path, e))?;
        Self::parse(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// True if tree-sitter had to recover from a syntax error
    pub fn has_errors(&self) -> bool {
        self.root().has_error()
    }

    /// Every import statement in the file, nested ones included
    pub fn imports(&self) -> Vec<ImportStmt> {
        let mut out = Vec::new();
        self.collect_imports(self.root(), false, &mut out);
        out
    }

    fn collect_imports(&self, node: Node, type_checking: bool, out: &mut Vec<ImportStmt>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if is_import_kind(child.kind()) {
                if let Some(stmt) = self.parse_import(child, type_checking) {
                    out.push(stmt);
                }
                continue;
            }
            let inside_type_checking = type_checking
                || (child.kind() == "if_statement"
                    && child
                        .child_by_field_name("condition")
                        .is_some_and(|c| is_type_checking_condition(c, &self.source)));
            if inside_type_checking && child.kind() == "if_statement" {
                // only the consequence is guarded
                if let Some(consequence) = child.child_by_field_name("consequence") {
                    self.collect_imports(consequence, true, out);
                }
                let mut alt_cursor = child.walk();
                for alt in child.children_by_field_name("alternative", &mut alt_cursor) {
                    self.collect_imports(alt, type_checking, out);
                }
                continue;
            }
            self.collect_imports(child, type_checking, out);
        }
    }

    fn parse_import(&self, node: Node, type_checking: bool) -> Option<ImportStmt> {
        let src = self.source.as_str();
        let mut names = Vec::new();
        let mut wildcard = false;

        let form = match node.kind() {
            "import_statement" => ImportForm::Plain,
            "future_import_statement" => ImportForm::Future,
            "import_from_statement" => {
                let module_node = node.child_by_field_name("module_name")?;
                if module_node.kind() == "relative_import" {
                    let mut level = 0;
                    let mut module = None;
                    let mut cursor = module_node.walk();
                    for part in module_node.children(&mut cursor) {
                        match part.kind() {
                            "import_prefix" => level = text(part, src).len(),
                            "dotted_name" => module = Some(text(part, src).to_string()),
                            _ => {}
                        }
                    }
                    ImportForm::From { module, level }
                } else {
                    let module = text(module_node, src).to_string();
                    if module == "__future__" {
                        ImportForm::Future
                    } else {
                        ImportForm::From {
                            module: Some(module),
                            level: 0,
                        }
                    }
                }
            }
            _ => return None,
        };

        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            match child.kind() {
                "dotted_name" | "identifier" => names.push(ImportedName {
                    name: text(child, src).to_string(),
                    alias: None,
                }),
                "aliased_import" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| text(n, src).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| text(n, src).to_string());
                    names.push(ImportedName { name, alias });
                }
                _ => {}
            }
        }
        let mut cursor = node.walk();
        if node
            .children(&mut cursor)
            .any(|c| c.kind() == "wildcard_import")
        {
            wildcard = true;
        }

        let parent = node.parent();
        let top_level = parent.is_some_and(|p| p.kind() == "module");
        let block = parent.filter(|p| p.kind() == "block").map(|p| BlockRef {
            start_byte: p.start_byte(),
            statements: statement_count(p),
        });

        Some(ImportStmt {
            form,
            names,
            wildcard,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            top_level,
            type_checking,
            block,
        })
    }

    /// Dotted module names this file imports, in first-seen order
    pub fn imported_modules(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |m: String| {
            if !m.is_empty() && !out.contains(&m) {
                out.push(m);
            }
        };
        for stmt in self.imports() {
            match &stmt.form {
                ImportForm::Future => {}
                ImportForm::Plain => stmt.names.iter().for_each(|n| push(n.name.clone())),
                ImportForm::From {
                    module: Some(module),
                    ..
                } => push(module.clone()),
                ImportForm::From { module: None, .. } => {
                    stmt.names.iter().for_each(|n| push(n.name.clone()))
                }
            }
        }
        out
    }

    pub fn outline(&self) -> Outline {
        let src = self.source.as_str();
        let mut outline = Outline {
            lines: src.lines().count(),
            ..Default::default()
        };
        let root = self.root();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            let def = unwrap_definition(child);
            let name = def
                .child_by_field_name("name")
                .map(|n| text(n, src).to_string());
            match (def.kind(), name) {
                ("function_definition", Some(name)) => outline.functions.push(name),
                ("class_definition", Some(name)) => outline.classes.push(name),
                _ => {}
            }
        }
        outline
    }

    /// Identifiers read anywhere outside import statements
    pub fn used_names(&self) -> HashSet<String> {
        names_used_in(self.root(), &self.source)
    }

    /// String entries of a module-level `__all__` list or tuple
    pub fn all_exports(&self) -> HashSet<String> {
        let src = self.source.as_str();
        let mut out = HashSet::new();
        visit(self.root(), &mut |node| {
            if node.kind() != "assignment" && node.kind() != "augmented_assignment" {
                return true;
            }
            let is_all = node
                .child_by_field_name("left")
                .is_some_and(|l| text(l, src) == "__all__");
            if is_all {
                if let Some(right) = node.child_by_field_name("right") {
                    visit(right, &mut |n| {
                        if n.kind() == "string_content" {
                            out.insert(text(n, src).to_string());
                        }
                        true
                    });
                }
            }
            false
        });
        out
    }

    /// Classes anywhere in the file with their direct methods
    pub fn classes(&self) -> Vec<ClassInfo> {
        let src = self.source.as_str();
        let mut classes = Vec::new();
        visit(self.root(), &mut |node| {
            if node.kind() == "class_definition" {
                if let Some(info) = class_info(node, src) {
                    classes.push(info);
                }
            }
            true
        });
        classes
    }

    /// Body consists only of imports, `__all__`, docstrings and `pass`
    pub fn is_facade(&self) -> bool {
        let src = self.source.as_str();
        let root = self.root();
        let mut has_import = false;
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "comment" | "pass_statement" => {}
                k if is_import_kind(k) => has_import = true,
                "expression_statement" => {
                    let mut inner = child.walk();
                    let ok = child.named_children(&mut inner).all(|expr| match expr.kind() {
                        "string" | "concatenated_string" => true,
                        "assignment" | "augmented_assignment" => expr
                            .child_by_field_name("left")
                            .is_some_and(|l| text(l, src) == "__all__"),
                        _ => false,
                    });
                    if !ok {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        has_import
    }

    /// First class with enough static-like methods to be worth extracting
    pub fn suggest_extract_class(&self) -> Option<(String, Vec<String>)> {
        self.classes().into_iter().find_map(|class| {
            let methods: Vec<String> = class
                .methods
                .iter()
                .filter(|m| m.is_extractable())
                .map(|m| m.name.clone())
                .collect();
            (methods.len() >= MIN_EXTRACTABLE_METHODS).then(|| (class.name, methods))
        })
    }

    /// Filter split hints down to stems that form a clean extraction
    ///
    /// Returns the hinted paths whose stems this file imports, provided at
    /// least one top-level function or class uses imports from those stems
    /// and nothing else. Otherwise returns an empty list.
    pub fn clean_split_targets(&self, hinted_paths: &[String]) -> Vec<String> {
        let hinted: Vec<(&String, &str)> = hinted_paths
            .iter()
            .map(|p| (p, crate::models::path_stem(p)))
            .collect();

        let mut binding_stems: HashMap<String, Vec<String>> = HashMap::new();
        let mut imported_stems: BTreeSet<String> = BTreeSet::new();
        for stmt in self.imports() {
            for (bound, stems) in stmt.stems_by_binding() {
                imported_stems.extend(stems.iter().cloned());
                binding_stems.entry(bound).or_default().extend(stems);
            }
        }

        let kept: Vec<(&String, &str)> = hinted
            .into_iter()
            .filter(|(_, stem)| imported_stems.contains(*stem))
            .collect();
        if kept.is_empty() {
            return Vec::new();
        }
        let kept_stems: HashSet<&str> = kept.iter().map(|(_, s)| *s).collect();

        let src = self.source.as_str();
        let root = self.root();
        let mut cursor = root.walk();
        let has_clean_def = root.named_children(&mut cursor).any(|child| {
            let def = unwrap_definition(child);
            if !matches!(def.kind(), "function_definition" | "class_definition") {
                return false;
            }
            let mut usage: HashSet<String> = HashSet::new();
            for name in names_used_in(child, src) {
                if let Some(stems) = binding_stems.get(&name) {
                    // prefer the hinted stem when the binding resolves to one
                    let primary = stems
                        .iter()
                        .find(|s| kept_stems.contains(s.as_str()))
                        .or_else(|| stems.first());
                    if let Some(primary) = primary {
                        usage.insert(primary.clone());
                    }
                }
            }
            !usage.is_empty() && usage.iter().all(|s| kept_stems.contains(s.as_str()))
        });

        if !has_clean_def {
            return Vec::new();
        }
        kept.into_iter().map(|(p, _)| p.clone()).collect()
    }
}

/// Identifiers under `node` that are not part of import statements
pub(crate) fn names_used_in(node: Node, source: &str) -> HashSet<String> {
    let mut used = HashSet::new();
    visit(node, &mut |n| {
        if is_import_kind(n.kind()) {
            return false;
        }
        if n.kind() == "identifier" {
            used.insert(text(n, source).to_string());
        }
        true
    });
    used
}

/// Whether a function body touches `self.<attr>`
///
/// Stores count as well as reads: a method that only assigns `self.x`
/// still needs an instance and must not become a static helper.
pub(crate) fn uses_self_attributes(func: Node, source: &str) -> bool {
    let Some(body) = func.child_by_field_name("body") else {
        return false;
    };
    let mut found = false;
    visit(body, &mut |n| {
        if found {
            return false;
        }
        if n.kind() == "attribute"
            && n.child_by_field_name("object")
                .is_some_and(|o| o.kind() == "identifier" && text(o, source) == "self")
        {
            found = true;
            return false;
        }
        true
    });
    found
}

fn class_info(class_node: Node, source: &str) -> Option<ClassInfo> {
    let name = text(class_node.child_by_field_name("name")?, source).to_string();
    let body = class_node.child_by_field_name("body")?;
    let mut methods = Vec::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        let def = unwrap_definition(child);
        if def.kind() != "function_definition" {
            continue;
        }
        let Some(name_node) = def.child_by_field_name("name") else {
            continue;
        };
        let decorators = decorator_names(child, source);
        let is_static = decorators.iter().any(|d| *d == "staticmethod");
        methods.push(MethodInfo {
            name: text(name_node, source).to_string(),
            uses_self_attrs: uses_self_attributes(def, source),
            is_static,
            other_decorators: decorators.iter().any(|d| *d != "staticmethod"),
        });
    }
    Some(ClassInfo { name, methods })
}
