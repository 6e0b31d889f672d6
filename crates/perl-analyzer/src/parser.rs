//! Parser host: owns the grammar handle and turns source text into trees.
//!
//! The `Language` is materialized once; parsers are cheap and stateful, so
//! one is created per parse call.

use std::sync::OnceLock;

use tree_sitter::{Language, Node, Parser, Point, Tree};

use crate::error::AnalyzerError;

static LANGUAGE: OnceLock<Language> = OnceLock::new();

/// The Perl grammar handle, initialized on first use.
pub fn language() -> &'static Language {
    LANGUAGE.get_or_init(|| tree_sitter_perl::LANGUAGE.into())
}

fn new_parser() -> Result<Parser, AnalyzerError> {
    let mut parser = Parser::new();
    parser
        .set_language(language())
        .map_err(|_| AnalyzerError::Parse)?;
    Ok(parser)
}

/// Parse source text into a fresh syntax tree.
pub fn parse(text: &str) -> Result<Tree, AnalyzerError> {
    new_parser()?.parse(text, None).ok_or(AnalyzerError::Parse)
}

/// Cheap structural copy of a tree (copy-on-write under the hood).
pub fn copy(tree: &Tree) -> Tree {
    tree.clone()
}

/// Depth-first walk. `visit` returns whether to descend into the node's
/// children, which lets callers stop at `block` boundaries or error-free
/// subtrees.
pub fn for_each_node<'t, F>(node: Node<'t>, visit: &mut F)
where
    F: FnMut(Node<'t>) -> bool,
{
    if !visit(node) {
        return;
    }
    for i in 0..node.child_count() as u32 {
        if let Some(child) = node.child(i) {
            for_each_node(child, visit);
        }
    }
}

/// Smallest named node covering a point.
pub fn node_at<'t>(tree: &'t Tree, point: Point) -> Option<Node<'t>> {
    tree.root_node().named_descendant_for_point_range(point, point)
}

/// Node text; empty on (impossible for our parses) invalid UTF-8 slices.
pub fn text_of<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}
