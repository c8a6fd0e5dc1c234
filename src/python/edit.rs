//! Text-level rewrites of Python sources
//!
//! Edits are computed against tree-sitter byte ranges and spliced into the
//! original text, so formatting and comments outside the touched statements
//! survive untouched. Every function returns `None` when there is nothing
//! to change or the source does not parse cleanly.

use super::{
    names_used_in, text, unwrap_definition, uses_self_attributes, ImportForm, ImportStmt,
    PyModule, EXTRACTED_SUFFIX,
};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

pub(super) struct Edit {
    pub(super) start: usize,
    pub(super) end: usize,
    pub(super) replacement: String,
}

pub(super) fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    let mut out = source.to_string();
    for edit in edits {
        out.replace_range(edit.start..edit.end, &edit.replacement);
    }
    out
}

pub(super) fn line_start(source: &str, byte: usize) -> usize {
    source[..byte].rfind('\n').map_or(0, |i| i + 1)
}

pub(super) fn line_end_inclusive(source: &str, byte: usize) -> usize {
    source[byte..].find('\n').map_or(source.len(), |i| byte + i + 1)
}

/// Edit deleting a whole statement along with its line when it has one
fn removal_edit(source: &str, stmt: &ImportStmt) -> Edit {
    let start = line_start(source, stmt.start_byte);
    let end = line_end_inclusive(source, stmt.end_byte);
    let before = &source[start..stmt.start_byte];
    let after = &source[stmt.end_byte..end];
    if before.trim().is_empty() && after.trim().is_empty() {
        return Edit {
            start,
            end,
            replacement: String::new(),
        };
    }
    // statement shares its line with others, e.g. `import a; x = 1`
    let mut end = stmt.end_byte;
    let rest = &source[end..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    if let Some(after_semi) = trimmed.strip_prefix(';') {
        end = source.len() - after_semi.trim_start_matches([' ', '\t']).len();
    }
    Edit {
        start: stmt.start_byte,
        end,
        replacement: String::new(),
    }
}

/// Pending changes to a file's import statements
///
/// Whole-statement removals are held back until [`ImportEdits::finish`] so
/// a block emptied by several removals keeps a `pass` in place of the last.
#[derive(Default)]
struct ImportEdits<'s> {
    rewrites: Vec<Edit>,
    removed: Vec<&'s ImportStmt>,
}

impl<'s> ImportEdits<'s> {
    /// Keep `keep` names of `stmt`; delete the statement when none remain
    fn prune(&mut self, stmt: &'s ImportStmt, keep: &[bool]) {
        if keep.iter().all(|k| *k) {
            return;
        }
        let kept: Vec<_> = stmt
            .names
            .iter()
            .zip(keep)
            .filter(|(_, k)| **k)
            .map(|(n, _)| n)
            .collect();
        if kept.is_empty() {
            self.removed.push(stmt);
            return;
        }
        self.rewrites.push(Edit {
            start: stmt.start_byte,
            end: stmt.end_byte,
            replacement: stmt.render(&kept),
        });
    }

    fn remove(&mut self, stmt: &'s ImportStmt) {
        self.removed.push(stmt);
    }

    fn finish(self, source: &str) -> Option<String> {
        if self.rewrites.is_empty() && self.removed.is_empty() {
            return None;
        }
        let mut removed_per_block: HashMap<usize, (usize, usize)> = HashMap::new();
        for stmt in &self.removed {
            if let Some(block) = stmt.block {
                let entry = removed_per_block.entry(block.start_byte).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = entry.1.max(stmt.start_byte);
            }
        }
        let mut edits = self.rewrites;
        for stmt in self.removed {
            let keeps_block_alive = stmt.block.is_some_and(|block| {
                removed_per_block
                    .get(&block.start_byte)
                    .is_some_and(|(count, last)| {
                        *count >= block.statements && *last == stmt.start_byte
                    })
            });
            if keeps_block_alive {
                edits.push(Edit {
                    start: stmt.start_byte,
                    end: stmt.end_byte,
                    replacement: "pass".to_string(),
                });
            } else {
                edits.push(removal_edit(source, stmt));
            }
        }
        Some(apply_edits(source, edits))
    }
}

/// Remove every import of `target_module`, matching on the first dotted segment
///
/// `import a.b, c` loses only the `a.b` alias; `from a.x import y` is removed
/// as a whole. `from . import x` is never touched.
pub fn remove_import(source: &str, target_module: &str) -> Option<String> {
    let module = PyModule::parse(source).ok()?;
    if module.has_errors() {
        return None;
    }
    let target_first = target_module.split('.').next().unwrap_or(target_module);

    let imports = module.imports();
    let mut edits = ImportEdits::default();
    for stmt in &imports {
        match &stmt.form {
            ImportForm::Plain => {
                let keep: Vec<bool> = stmt
                    .names
                    .iter()
                    .map(|n| n.name.split('.').next() != Some(target_first))
                    .collect();
                edits.prune(stmt, &keep);
            }
            ImportForm::From {
                module: Some(from), ..
            } => {
                if from.split('.').next() == Some(target_first) {
                    edits.remove(stmt);
                }
            }
            _ => {}
        }
    }
    edits.finish(source)
}

/// Remove imports whose bound name is never read in the file
///
/// `__future__` and star imports are kept, as are names listed in `__all__`
/// and imports guarded by `if TYPE_CHECKING:`.
pub fn remove_unused_imports(source: &str) -> Option<String> {
    let module = PyModule::parse(source).ok()?;
    if module.has_errors() {
        return None;
    }
    let mut used = module.used_names();
    used.extend(module.all_exports());

    let imports = module.imports();
    let mut edits = ImportEdits::default();
    for stmt in &imports {
        if stmt.form == ImportForm::Future || stmt.wildcard || stmt.type_checking {
            continue;
        }
        let keep: Vec<bool> = stmt
            .names
            .iter()
            .map(|n| used.contains(&stmt.bound_name(n)))
            .collect();
        edits.prune(stmt, &keep);
    }
    edits.finish(source)
}

/// Result of moving static-like methods into a sibling module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedClass {
    pub new_rel_path: String,
    pub new_content: String,
    pub modified_original: String,
    pub class_name: String,
    pub extracted: Vec<String>,
}

/// Relative path and dotted module of the sibling file for `class_name`
pub fn extracted_sibling(target_file: &str, class_name: &str) -> (String, String) {
    let new_class = format!("{}{}", class_name, EXTRACTED_SUFFIX);
    let lower = new_class.to_lowercase();
    let without_ext = target_file.strip_suffix(".py").unwrap_or(target_file);
    let new_rel_path = format!("{}_{}.py", without_ext, lower);
    let module_path = format!("{}_{}", without_ext.replace('/', "."), lower);
    (new_rel_path, module_path)
}

struct Param {
    /// Source text as written, used in the extracted signature
    source: String,
    /// Argument text in a forwarding call
    call_arg: Option<String>,
    is_self: bool,
}

fn param_name(node: Node, src: &str) -> Option<(&'static str, String)> {
    match node.kind() {
        "identifier" => Some(("", text(node, src).to_string())),
        "list_splat_pattern" => node
            .named_child(0)
            .map(|n| ("*", text(n, src).to_string())),
        "dictionary_splat_pattern" => node
            .named_child(0)
            .map(|n| ("**", text(n, src).to_string())),
        "typed_parameter" => node.named_child(0).and_then(|n| param_name(n, src)),
        "default_parameter" | "typed_default_parameter" => node
            .child_by_field_name("name")
            .and_then(|n| param_name(n, src)),
        _ => None,
    }
}

fn collect_params(func: Node, src: &str) -> Vec<Param> {
    let Some(params) = func.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut keyword_only = false;
    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        match child.kind() {
            "keyword_separator" => {
                keyword_only = true;
                out.push(Param {
                    source: "*".to_string(),
                    call_arg: None,
                    is_self: false,
                });
                continue;
            }
            "positional_separator" => {
                out.push(Param {
                    source: "/".to_string(),
                    call_arg: None,
                    is_self: false,
                });
                continue;
            }
            "comment" => continue,
            _ => {}
        }
        let Some((prefix, name)) = param_name(child, src) else {
            continue;
        };
        let call_arg = if prefix.is_empty() && keyword_only {
            format!("{}={}", name, name)
        } else {
            format!("{}{}", prefix, name)
        };
        if prefix == "*" {
            keyword_only = true;
        }
        out.push(Param {
            source: text(child, src).to_string(),
            is_self: out.is_empty() && prefix.is_empty() && name == "self",
            call_arg: Some(call_arg),
        });
    }
    out
}

fn is_async(func: Node) -> bool {
    func.child(0).is_some_and(|c| c.kind() == "async")
}

fn reindent(body: &str, strip: usize, indent: &str) -> Vec<String> {
    body.lines()
        .map(|line| {
            if line.trim().is_empty() {
                return String::new();
            }
            let leading = line.len() - line.trim_start_matches([' ', '\t']).len();
            let cut = leading.min(strip);
            format!("{}{}", indent, &line[cut..])
        })
        .collect()
}

/// Body lines of `func` re-indented to `indent`
fn body_lines(func: Node, src: &str, indent: &str) -> Vec<String> {
    let Some(body) = func.child_by_field_name("body") else {
        return vec![format!("{}pass", indent)];
    };
    let start = line_start(src, body.start_byte());
    let prefix = &src[start..body.start_byte()];
    if prefix.trim().is_empty() {
        reindent(&src[start..body.end_byte()], prefix.len(), indent)
    } else {
        vec![format!("{}{}", indent, text(body, src).trim())]
    }
}

fn static_method_text(func: Node, src: &str, params: &[Param]) -> Vec<String> {
    let name = func
        .child_by_field_name("name")
        .map(|n| text(n, src))
        .unwrap_or_default();
    let signature = params
        .iter()
        .filter(|p| !p.is_self)
        .map(|p| p.source.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let ret = func
        .child_by_field_name("return_type")
        .map(|r| format!(" -> {}", text(r, src)))
        .unwrap_or_default();
    let async_kw = if is_async(func) { "async " } else { "" };

    let mut lines = vec![
        "    @staticmethod".to_string(),
        format!("    {}def {}({}){}:", async_kw, name, signature, ret),
    ];
    lines.extend(body_lines(func, src, "        "));
    lines
}

fn delegation_text(
    func: Node,
    src: &str,
    params: &[Param],
    indent: &str,
    new_class: &str,
    is_static: bool,
) -> String {
    let name = func
        .child_by_field_name("name")
        .map(|n| text(n, src))
        .unwrap_or_default();
    let params_src = func
        .child_by_field_name("parameters")
        .map(|p| text(p, src))
        .unwrap_or("()");
    let ret = func
        .child_by_field_name("return_type")
        .map(|r| format!(" -> {}", text(r, src)))
        .unwrap_or_default();
    let args = params
        .iter()
        .filter(|p| !p.is_self)
        .filter_map(|p| p.call_arg.as_deref())
        .collect::<Vec<_>>()
        .join(", ");
    let (async_kw, await_kw) = if is_async(func) {
        ("async ", "await ")
    } else {
        ("", "")
    };

    let mut out = String::new();
    if is_static {
        out.push_str(&format!("{}@staticmethod\n", indent));
    }
    out.push_str(&format!(
        "{}{}def {}{}{}:\n{}    return {}{}.{}({})",
        indent, async_kw, name, params_src, ret, indent, await_kw, new_class, name, args
    ));
    out
}

/// Module-level imports and constants that the extracted methods read
pub(super) fn module_dependencies(module: &PyModule, used: &HashSet<String>) -> Vec<String> {
    let src = module.source();
    let mut future = Vec::new();
    let mut imports = Vec::new();
    let mut constants = Vec::new();
    for stmt in module.imports().into_iter().filter(|s| s.top_level) {
        let stmt_text = src[stmt.start_byte..stmt.end_byte].to_string();
        if stmt.form == ImportForm::Future {
            future.push(stmt_text);
        } else if stmt.names.iter().any(|n| used.contains(&stmt.bound_name(n))) {
            imports.push(stmt_text);
        }
    }
    let root = module.root();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() != "expression_statement" {
            continue;
        }
        let Some(assign) = child.named_child(0).filter(|a| a.kind() == "assignment") else {
            continue;
        };
        let assigns_used = assign
            .child_by_field_name("left")
            .is_some_and(|l| l.kind() == "identifier" && used.contains(text(l, src)));
        if assigns_used {
            constants.push(text(child, src).to_string());
        }
    }
    future.into_iter().chain(imports).chain(constants).collect()
}

/// Byte offset after the last top-level import, or after the docstring
pub(super) fn import_insertion_point(module: &PyModule) -> usize {
    let src = module.source();
    if let Some(last) = module.imports().into_iter().filter(|s| s.top_level).last() {
        return line_end_inclusive(src, last.end_byte);
    }
    let root = module.root();
    if let Some(first) = root.named_child(0) {
        let is_docstring = first.kind() == "expression_statement"
            && first.named_child(0).is_some_and(|c| c.kind() == "string");
        if is_docstring {
            return line_end_inclusive(src, first.end_byte());
        }
    }
    0
}

/// Move methods of `target_class` that never read `self.<attr>` into a
/// static helper class in a sibling module
///
/// The original class keeps same-named methods that delegate to the new
/// class, and the module gains an import of it. Methods that are dunders,
/// touch instance state, or carry decorators other than `@staticmethod`
/// are left in place.
pub fn extract_class(
    source: &str,
    target_file: &str,
    target_class: &str,
    methods_to_extract: &[String],
) -> Option<ExtractedClass> {
    let module = PyModule::parse(source).ok()?;
    if module.has_errors() {
        return None;
    }
    let src = module.source();

    let mut class_node = None;
    super::visit(module.root(), &mut |n| {
        if class_node.is_some() {
            return false;
        }
        if n.kind() == "class_definition"
            && n.child_by_field_name("name")
                .is_some_and(|name| text(name, src) == target_class)
        {
            class_node = Some(n);
            return false;
        }
        true
    });
    let body = class_node?.child_by_field_name("body")?;

    // (outer node, function node, static?) in requested order
    let mut chosen = Vec::new();
    for wanted in methods_to_extract {
        let mut cursor = body.walk();
        let found = body.named_children(&mut cursor).find(|child| {
            let def = unwrap_definition(*child);
            def.kind() == "function_definition"
                && def
                    .child_by_field_name("name")
                    .is_some_and(|n| text(n, src) == wanted)
        });
        let Some(outer) = found else { continue };
        let def = unwrap_definition(outer);
        let decorators = super::decorator_names(outer, src);
        if decorators.iter().any(|d| *d != "staticmethod") {
            continue;
        }
        let is_dunder = wanted.starts_with("__") && wanted.ends_with("__");
        if is_dunder || uses_self_attributes(def, src) {
            continue;
        }
        chosen.push((outer, def, !decorators.is_empty()));
    }
    if chosen.is_empty() {
        return None;
    }

    let new_class = format!("{}{}", target_class, EXTRACTED_SUFFIX);
    let (new_rel_path, module_path) = extracted_sibling(target_file, target_class);

    let mut used = HashSet::new();
    let mut method_blocks = Vec::new();
    let mut edits = Vec::new();
    for (outer, def, is_static) in &chosen {
        let params = collect_params(*def, src);
        used.extend(names_used_in(*def, src));
        method_blocks.push(static_method_text(*def, src, &params));

        let start = line_start(src, outer.start_byte());
        let indent: String = src[start..outer.start_byte()]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        edits.push(Edit {
            start,
            end: outer.end_byte(),
            replacement: delegation_text(*def, src, &params, &indent, &new_class, *is_static),
        });
    }
    edits.push(Edit {
        start: import_insertion_point(&module),
        end: import_insertion_point(&module),
        replacement: format!("from {} import {}\n", module_path, new_class),
    });

    let mut lines = vec![
        "\"\"\"Extracted from parent class to reduce complexity.\"\"\"".to_string(),
        String::new(),
    ];
    let deps = module_dependencies(&module, &used);
    if !deps.is_empty() {
        lines.extend(deps);
        lines.push(String::new());
        lines.push(String::new());
    }
    lines.push(format!("class {}:", new_class));
    lines.push("    \"\"\"Extracted methods (static).\"\"\"".to_string());
    for block in method_blocks {
        lines.push(String::new());
        lines.extend(block);
    }
    let new_content = format!("{}\n", lines.join("\n").trim_end());

    let mut modified = apply_edits(src, edits);
    if !modified.ends_with('\n') {
        modified.push('\n');
    }

    Some(ExtractedClass {
        new_rel_path,
        new_content,
        modified_original: modified,
        class_name: new_class,
        extracted: chosen
            .iter()
            .filter_map(|(_, def, _)| def.child_by_field_name("name"))
            .map(|n| text(n, src).to_string())
            .collect(),
    })
}
