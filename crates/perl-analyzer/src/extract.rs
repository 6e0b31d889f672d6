//! Symbol extraction: one pass over a parse tree producing the per-file
//! index, plus the short-circuiting syntax-diagnostic walk.

use tree_sitter::{Node, Tree};

use crate::kinds;
use crate::parser::{for_each_node, text_of};
use crate::types::{Diagnostic, FunctionReference, PerFileIndex, Position, Range};

/// Extract declarations and call sites from a parsed document.
pub fn extract_symbols(uri: &str, tree: &Tree, source: &str) -> PerFileIndex {
    let mut index = PerFileIndex::default();

    for_each_node(tree.root_node(), &mut |node| {
        let kind = node.kind();
        if kinds::is_function_declaration(kind) {
            if let Some(name_node) = node.child_by_field_name("name") {
                index.declarations.push(make_reference(uri, name_node, node, source));
            }
        } else if kinds::is_call_expression(kind) {
            if let Some(name_node) = call_name_node(node) {
                let reference = make_reference(uri, name_node, node, source);
                index
                    .references
                    .entry(reference.function_name.clone())
                    .or_default()
                    .push(reference);
            }
        }
        true
    });

    index
}

/// The callee name node: a known field on the call node itself, or on its
/// first child (wrapped call forms).
fn call_name_node(node: Node) -> Option<Node> {
    for field in kinds::CALL_NAME_FIELDS {
        if let Some(n) = node.child_by_field_name(field) {
            return Some(n);
        }
    }
    let first = node.child(0)?;
    for field in kinds::CALL_NAME_FIELDS {
        if let Some(n) = first.child_by_field_name(field) {
            return Some(n);
        }
    }
    None
}

/// Build the index record for a name node. Qualified callee names
/// (`Foo::Bar::greet`) are narrowed to the trailing identifier so the stored
/// position covers exactly the name, and `package_name` is resolved from the
/// innermost enclosing package statement.
fn make_reference(uri: &str, name_node: Node, context: Node, source: &str) -> FunctionReference {
    let full = text_of(name_node, source);
    let mut range = Range::of_node(&name_node);
    let function_name = match full.rfind("::") {
        Some(idx) => {
            let tail = &full[idx + 2..];
            range.start = Position::new(range.end.row, range.end.column - tail.len() as u32);
            tail.to_string()
        }
        None => full.to_string(),
    };

    FunctionReference {
        uri: uri.to_string(),
        function_name,
        package_name: enclosing_package(context, source),
        position: range,
    }
}

/// Walk ancestors until one contains package statements; the last such
/// statement starting at or before the node wins (nested packages allowed).
/// No enclosing package means top-level script: "".
pub fn enclosing_package(node: Node, source: &str) -> String {
    let start = node.start_position();
    let mut current = node;
    while let Some(ancestor) = current.parent() {
        let mut last: Option<Node> = None;
        for_each_node(ancestor, &mut |n| {
            if kinds::is_package_statement(n.kind()) && n.start_position() <= start {
                last = Some(n);
            }
            // Package statements never nest inside another package statement.
            !kinds::is_package_statement(n.kind())
        });
        if let Some(stmt) = last {
            return package_name_of(stmt, source);
        }
        current = ancestor;
    }
    String::new()
}

fn package_name_of(stmt: Node, source: &str) -> String {
    if let Some(name) = stmt.child_by_field_name("name") {
        return text_of(name, source).to_string();
    }
    for i in 0..stmt.named_child_count() as u32 {
        if let Some(child) = stmt.named_child(i) {
            if kinds::is_package_name(child.kind()) {
                return text_of(child, source).to_string();
            }
        }
    }
    String::new()
}

/// Syntax diagnostics. The walk descends only into subtrees that carry an
/// error or missing node and stops once `limit` problems were produced.
pub fn syntax_diagnostics(tree: &Tree, source: &str, limit: usize) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    if limit == 0 {
        return out;
    }
    collect_diagnostics(tree.root_node(), source, limit, &mut out);
    out
}

fn collect_diagnostics(node: Node, source: &str, limit: usize, out: &mut Vec<Diagnostic>) {
    if out.len() >= limit {
        return;
    }
    if !node.has_error() && !node.is_missing() {
        return;
    }
    if node.is_error() {
        let text = text_of(node, source);
        out.push(Diagnostic {
            range: Range::of_node(&node),
            message: format!("Syntax Error near expression \"{}\"", text.trim()),
        });
        return;
    }
    if node.is_missing() {
        out.push(Diagnostic {
            range: Range::of_node(&node),
            message: format!("Syntax error: expected \"{}\"", node.kind()),
        });
        return;
    }
    for i in 0..node.child_count() as u32 {
        if let Some(child) = node.child(i) {
            collect_diagnostics(child, source, limit, out);
        }
    }
}
