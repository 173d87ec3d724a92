//! Parse-tree extraction
//!
//! Parses generated Python sources with tree-sitter and reduces the tree to
//! the facts the other layers need: imports, call targets, function names,
//! decorators, assert/loop shape, and a comment/whitespace-insensitive
//! fingerprint.

use casegen_model::CodeHash;
use tree_sitter::{Node, Parser};

use crate::error::ValidateError;

/// Facts extracted from one parsed source
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    /// ERROR / missing nodes encountered
    pub syntax_errors: usize,
    /// Imported module roots (`os.path` -> `os`)
    pub imports: Vec<String>,
    /// Call targets as written (`eval`, `os.system`, `page.click`)
    pub calls: Vec<String>,
    /// Defined function names
    pub functions: Vec<String>,
    /// Decorator lines as written, without the leading `@`
    pub decorators: Vec<String>,
    /// `assert` statements seen
    pub assert_count: usize,
    /// `while True:` loops with no `break` in their body
    pub unbounded_loops: usize,
    /// Fingerprint of the tree with comments and whitespace stripped
    pub fingerprint: CodeHash,
}

/// Parse one source
///
/// # Errors
/// - [`ValidateError::Language`] if the Python grammar cannot be loaded
/// - [`ValidateError::ParserUnavailable`] if parsing yields no tree
pub fn parse(code: &str) -> Result<ParsedSource, ValidateError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ValidateError::Language(e.to_string()))?;

    let tree = parser
        .parse(code, None)
        .ok_or(ValidateError::ParserUnavailable)?;

    let mut parsed = ParsedSource::default();
    let mut normalized: Vec<u8> = Vec::with_capacity(code.len());
    collect(tree.root_node(), code.as_bytes(), &mut parsed, &mut normalized);
    parsed.fingerprint = CodeHash::compute_tree(&normalized);
    Ok(parsed)
}

fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or_default()
}

/// Module root of a dotted import path
fn import_root(path: &str) -> String {
    path.split('.').next().unwrap_or(path).trim().to_string()
}

fn collect(node: Node<'_>, source: &[u8], out: &mut ParsedSource, normalized: &mut Vec<u8>) {
    if node.is_error() || node.is_missing() {
        out.syntax_errors += 1;
    }

    let kind = node.kind();
    if kind == "comment" {
        return;
    }

    if node.is_named() {
        normalized.extend_from_slice(kind.as_bytes());
        normalized.push(0);
        if node.named_child_count() == 0 {
            normalized.extend_from_slice(node_text(node, source).as_bytes());
            normalized.push(0);
        }
    }

    match kind {
        "import_statement" => {
            for i in 0..node.named_child_count() {
                if let Some(child) = node.named_child(i) {
                    match child.kind() {
                        "dotted_name" => out.imports.push(import_root(node_text(child, source))),
                        "aliased_import" => {
                            if let Some(name) = child.child_by_field_name("name") {
                                out.imports.push(import_root(node_text(name, source)));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        "import_from_statement" => {
            if let Some(module) = node.child_by_field_name("module_name") {
                out.imports.push(import_root(node_text(module, source)));
            }
        }
        "call" => {
            if let Some(function) = node.child_by_field_name("function") {
                out.calls.push(node_text(function, source).to_string());
            }
        }
        "function_definition" => {
            if let Some(name) = node.child_by_field_name("name") {
                out.functions.push(node_text(name, source).to_string());
            }
        }
        "decorator" => {
            let text = node_text(node, source).trim_start_matches('@').trim();
            out.decorators.push(text.to_string());
        }
        "assert_statement" => {
            out.assert_count += 1;
        }
        "while_statement" => {
            let condition_is_true = node
                .child_by_field_name("condition")
                .map(|c| node_text(c, source).trim() == "True")
                .unwrap_or(false);
            if condition_is_true {
                let has_break = node
                    .child_by_field_name("body")
                    .map(|body| subtree_contains(body, "break_statement"))
                    .unwrap_or(false);
                if !has_break {
                    out.unbounded_loops += 1;
                }
            }
        }
        _ => {}
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect(child, source, out, normalized);
        }
    }
}

fn subtree_contains(node: Node<'_>, kind: &str) -> bool {
    if node.kind() == kind {
        return true;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if subtree_contains(child, kind) {
                return true;
            }
        }
    }
    false
}
