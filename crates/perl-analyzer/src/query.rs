//! Queries over the workspace index. Everything here is a pure read: the
//! index is taken by shared reference and nothing suspends.

use tree_sitter::{Node, Point, Tree};

use crate::index::WorkspaceIndex;
use crate::kinds;
use crate::parser::{node_at, text_of};
use crate::scope;
use crate::types::{FunctionReference, Location, Range};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// The symbol-bearing named node at a point. `varname` leaves resolve to
/// their enclosing variable node.
pub fn symbol_node_at<'t>(tree: &'t Tree, point: Point) -> Option<Node<'t>> {
    let mut node = node_at(tree, point)?;
    if node.kind() == "varname" {
        node = node.parent()?;
    }
    Some(node)
}

/// Qualified names resolve by their trailing identifier.
fn trailing_identifier(text: &str) -> &str {
    match text.rfind("::") {
        Some(idx) => &text[idx + 2..],
        None => text,
    }
}

fn parent_kind(node: Node) -> String {
    node.parent().map(|p| p.kind().to_string()).unwrap_or_default()
}

/// Whether an identifier node sits in function position: under a call
/// expression, a method invocation, or a declaration.
fn in_function_position(node: Node) -> bool {
    kinds::is_function_context(&parent_kind(node)) || kinds::is_function_context(node.kind())
}

// ── Definition ──────────────────────────────────────────────────

pub fn definition(
    index: &WorkspaceIndex,
    uri: &str,
    tree: &Tree,
    source: &str,
    point: Point,
) -> Vec<Location> {
    let Some(node) = symbol_node_at(tree, point) else {
        return Vec::new();
    };

    if kinds::is_variable(node.kind()) {
        let text = text_of(node, source);
        return scope::first_occurrence(tree, source, node, text)
            .map(|occ| Location {
                uri: uri.to_string(),
                range: occ.range,
            })
            .into_iter()
            .collect();
    }

    let name = trailing_identifier(text_of(node, source)).to_string();
    let mut out = Vec::new();
    for (decl_uri, decls) in index.declarations_by_uri() {
        for decl in decls {
            if decl.function_name == name {
                out.push(Location {
                    uri: decl_uri.to_string(),
                    range: decl.position,
                });
            }
        }
    }
    out
}

// ── References / document highlight ─────────────────────────────

pub fn references(
    index: &WorkspaceIndex,
    uri: &str,
    tree: &Tree,
    source: &str,
    point: Point,
    only_current_file: bool,
) -> Vec<Location> {
    let Some(node) = symbol_node_at(tree, point) else {
        return Vec::new();
    };

    if kinds::is_variable(node.kind()) {
        let text = text_of(node, source);
        return scope::all_occurrences(tree, source, node, text)
            .into_iter()
            .map(|occ| Location {
                uri: uri.to_string(),
                range: occ.range,
            })
            .collect();
    }

    if !in_function_position(node) {
        return Vec::new();
    }

    let name = trailing_identifier(text_of(node, source)).to_string();
    let mut out = Vec::new();
    for (ref_uri, by_name) in index.references_by_uri() {
        if only_current_file && ref_uri != uri {
            continue;
        }
        if let Some(refs) = by_name.get(&name) {
            out.extend(refs.iter().map(|r| Location {
                uri: ref_uri.to_string(),
                range: r.position,
            }));
        }
    }
    for (decl_uri, decls) in index.declarations_by_uri() {
        if only_current_file && decl_uri != uri {
            continue;
        }
        for decl in decls {
            if decl.function_name == name {
                out.push(Location {
                    uri: decl_uri.to_string(),
                    range: decl.position,
                });
            }
        }
    }
    out
}

// ── Rename ──────────────────────────────────────────────────────

/// One textual replacement in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEdit {
    pub uri: String,
    pub range: Range,
    pub new_text: String,
}

pub fn rename(
    index: &WorkspaceIndex,
    uri: &str,
    tree: &Tree,
    source: &str,
    point: Point,
    new_name: &str,
) -> Result<Vec<RenameEdit>, QueryError> {
    if new_name.is_empty() {
        return Err(QueryError::InvalidParams("empty rename target".to_string()));
    }
    let Some(node) = symbol_node_at(tree, point) else {
        return Err(QueryError::InvalidParams("no symbol at position".to_string()));
    };

    if kinds::is_variable(node.kind()) {
        // The sigil stays; edits start one column past it.
        let bare = new_name.trim_start_matches(['$', '@', '%']);
        let text = text_of(node, source);
        let edits = scope::all_occurrences(tree, source, node, text)
            .into_iter()
            .map(|occ| {
                let mut range = occ.range;
                range.start.column += 1;
                RenameEdit {
                    uri: uri.to_string(),
                    range,
                    new_text: bare.to_string(),
                }
            })
            .collect();
        return Ok(edits);
    }

    if !in_function_position(node) {
        return Err(QueryError::InvalidParams(format!(
            "cannot rename a {} node",
            node.kind()
        )));
    }

    let edits = references(index, uri, tree, source, point, false)
        .into_iter()
        .map(|loc| RenameEdit {
            uri: loc.uri,
            range: loc.range,
            new_text: new_name.to_string(),
        })
        .collect();
    Ok(edits)
}

/// Range and current text for the rename UI; the caller decides
/// renameability when the actual rename arrives.
pub fn prepare_rename(tree: &Tree, source: &str, point: Point) -> Option<(Range, String)> {
    let node = symbol_node_at(tree, point)?;
    Some((Range::of_node(&node), text_of(node, source).to_string()))
}

// ── Hover ───────────────────────────────────────────────────────

pub fn hover(tree: &Tree, source: &str, point: Point) -> Option<String> {
    let node = symbol_node_at(tree, point)?;

    if kinds::is_variable(node.kind()) {
        let label = kinds::variable_kind_label(node.kind());
        let text = text_of(node, source);
        return Some(format!("```perl\nmy {text}; # {label}\n```"));
    }

    let parent = node.parent()?;
    if parent.kind().contains("call_expression") || parent.kind().contains("method_call") {
        let call_text = text_of(parent, source);
        return Some(format!("```perl\nsub {call_text}; # function\n```"));
    }
    None
}

// ── Symbols ─────────────────────────────────────────────────────

/// Case-insensitive substring match across every declaration. Empty query
/// matches nothing.
pub fn workspace_symbols(index: &WorkspaceIndex, query: &str) -> Vec<FunctionReference> {
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut out = Vec::new();
    for (_, decls) in index.declarations_by_uri() {
        for decl in decls {
            if decl.function_name.to_lowercase().contains(&needle) {
                out.push(decl.clone());
            }
        }
    }
    out
}

// ── Completion ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Variable,
    Function,
    Package,
}

/// Data a function candidate carries into completion-resolve so the import
/// edit can be synthesized without re-running the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveData {
    pub source_uri: String,
    pub package_name: String,
    pub function_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub insert_text: String,
    pub kind: CandidateKind,
    pub from_current_file: bool,
    pub resolve: Option<ResolveData>,
}

/// Label shaping from `perl.functionCallStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionCallStyle {
    #[default]
    PackageAndFunction,
    FunctionNameOnly,
}

pub fn completion(
    index: &WorkspaceIndex,
    uri: &str,
    tree: &Tree,
    source: &str,
    point: Point,
    trigger: Option<char>,
    call_style: FunctionCallStyle,
) -> Vec<CompletionCandidate> {
    if scope_keyword_precedes(tree, source, point) {
        return Vec::new();
    }

    if let Some(sigil) = trigger.filter(|c| matches!(c, '$' | '@' | '%')) {
        return variable_candidates(tree, source, point, sigil);
    }

    let word = word_before(source, point);
    if word.starts_with(['$', '@', '%']) {
        let sigil = word.chars().next().unwrap_or('$');
        return variable_candidates(tree, source, point, sigil);
    }

    let mut out = Vec::new();
    let needle = word.to_lowercase();
    let in_use = in_use_statement(tree, point);

    for (decl_uri, decls) in index.declarations_by_uri() {
        let Some(first) = decls.first() else { continue };
        if !first.package_name.is_empty()
            && first.package_name.to_lowercase().contains(&needle)
        {
            let insert = if in_use {
                first.package_name.clone()
            } else {
                format!("{}::", first.package_name)
            };
            out.push(CompletionCandidate {
                label: first.package_name.clone(),
                insert_text: insert,
                kind: CandidateKind::Package,
                from_current_file: decl_uri == uri,
                resolve: None,
            });
        }
    }

    // Qualified words (`Foo::Bar::gr`) match functions by their trailing
    // segment; the package part already narrowed the package candidates.
    let fn_needle = trailing_identifier(&needle).to_string();
    let mut functions: Vec<CompletionCandidate> = Vec::new();
    for (decl_uri, decls) in index.declarations_by_uri() {
        for decl in decls {
            if !decl.function_name.to_lowercase().contains(&fn_needle) {
                continue;
            }
            let label = match call_style {
                FunctionCallStyle::FunctionNameOnly => decl.function_name.clone(),
                FunctionCallStyle::PackageAndFunction if !decl.package_name.is_empty() => {
                    format!("{}::{}", decl.package_name, decl.function_name)
                }
                FunctionCallStyle::PackageAndFunction => decl.function_name.clone(),
            };
            let resolve = (decl_uri != uri && !decl.package_name.is_empty()).then(|| ResolveData {
                source_uri: decl_uri.to_string(),
                package_name: decl.package_name.clone(),
                function_name: decl.function_name.clone(),
            });
            functions.push(CompletionCandidate {
                label,
                insert_text: format!("{}()", decl.function_name),
                kind: CandidateKind::Function,
                from_current_file: decl_uri == uri,
                resolve,
            });
        }
    }
    // Current-file declarations sort ahead of the rest of the workspace.
    functions.sort_by_key(|c| !c.from_current_file);
    out.extend(functions);
    out
}

fn variable_candidates(
    tree: &Tree,
    source: &str,
    point: Point,
    sigil: char,
) -> Vec<CompletionCandidate> {
    let node = node_at(tree, point).unwrap_or_else(|| tree.root_node());
    let mut seen = std::collections::HashSet::new();
    scope::visible_variables(tree, source, node)
        .into_iter()
        .filter(|occ| occ.text.starts_with(sigil))
        .filter(|occ| seen.insert(occ.text.clone()))
        .map(|occ| CompletionCandidate {
            label: occ.text.clone(),
            insert_text: occ.text.trim_start_matches(['$', '@', '%']).to_string(),
            kind: CandidateKind::Variable,
            from_current_file: true,
            resolve: None,
        })
        .collect()
}

/// The token immediately before the cursor, skipping whitespace backwards on
/// the cursor's line.
fn scope_keyword_precedes(tree: &Tree, source: &str, point: Point) -> bool {
    let Some(line) = source.lines().nth(point.row) else {
        return false;
    };
    let upto = &line[..point.column.min(line.len())];
    let Some(last) = upto.rfind(|c: char| !c.is_whitespace()) else {
        return false;
    };
    let probe = Point::new(point.row, last);
    let Some(node) = tree.root_node().descendant_for_point_range(probe, probe) else {
        return false;
    };
    kinds::is_scope_keyword(node.kind(), text_of(node, source))
}

fn in_use_statement(tree: &Tree, point: Point) -> bool {
    let Some(mut node) = node_at(tree, point) else {
        return false;
    };
    loop {
        if kinds::is_use_statement(node.kind()) {
            return true;
        }
        match node.parent() {
            Some(p) => node = p,
            None => return false,
        }
    }
}

/// The identifier being typed: trailing `[A-Za-z0-9_:]` (plus a leading
/// sigil) before the cursor.
fn word_before(source: &str, point: Point) -> String {
    let Some(line) = source.lines().nth(point.row) else {
        return String::new();
    };
    let upto = &line[..point.column.min(line.len())];
    let start = upto
        .rfind(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | ':' | '$' | '@' | '%')))
        .map(|i| i + 1)
        .unwrap_or(0);
    upto[start..].to_string()
}
