//! On-demand variable visibility.
//!
//! Variables are not stored in the index; visibility at a point is computed
//! from the tree each time: every variable node inside the outermost
//! enclosing `block` of the query node, unioned with the file's root-level
//! variables. Neither walk descends into nested blocks, which gives
//! "lexically visible here" as a cheap over-approximation.

use tree_sitter::{Node, Tree};

use crate::kinds;
use crate::parser::{for_each_node, text_of};
use crate::types::Range;

/// One textual occurrence of a variable (declaration or use; the walk does
/// not distinguish).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarOccurrence {
    pub text: String,
    pub range: Range,
}

/// The outermost `block` ancestor of a node, if any.
fn outermost_block<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut found = None;
    let mut current = node;
    while let Some(parent) = current.parent() {
        if kinds::is_block(parent.kind()) {
            found = Some(parent);
        }
        current = parent;
    }
    found
}

/// Collect variable nodes under `root`, stopping at block boundaries.
/// `root` itself is entered even when it is a block.
fn collect_shallow(root: Node, source: &str, out: &mut Vec<VarOccurrence>) {
    let root_id = root.id();
    for_each_node(root, &mut |n| {
        if kinds::is_variable(n.kind()) {
            out.push(VarOccurrence {
                text: text_of(n, source).to_string(),
                range: Range::of_node(&n),
            });
            return true;
        }
        n.id() == root_id || !kinds::is_block(n.kind())
    });
}

/// All variable occurrences visible at `node`, in document order.
pub fn visible_variables(tree: &Tree, source: &str, node: Node) -> Vec<VarOccurrence> {
    let mut out = Vec::new();
    if let Some(block) = outermost_block(node) {
        collect_shallow(block, source, &mut out);
    }
    collect_shallow(tree.root_node(), source, &mut out);
    out.sort_by_key(|o| o.range.start);
    out.dedup();
    out
}

/// First visible occurrence matching `text`: the definition query.
pub fn first_occurrence(tree: &Tree, source: &str, node: Node, text: &str) -> Option<VarOccurrence> {
    visible_variables(tree, source, node)
        .into_iter()
        .find(|o| o.text == text)
}

/// Every visible occurrence matching `text`, including those after the
/// query point: the references query.
pub fn all_occurrences(tree: &Tree, source: &str, node: Node, text: &str) -> Vec<VarOccurrence> {
    visible_variables(tree, source, node)
        .into_iter()
        .filter(|o| o.text == text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{node_at, parse};
    use crate::types::Position;
    use tree_sitter::Point;

    const SCOPED: &str = "my $outer = 1;\nsub f {\n    my $inner = 2;\n    $inner;\n}\n$outer;\n";

    fn variable_at<'t>(tree: &'t Tree, point: Point) -> Node<'t> {
        let mut node = node_at(tree, point).unwrap();
        while !kinds::is_variable(node.kind()) {
            node = node.parent().expect("variable node above cursor");
        }
        node
    }

    #[test]
    fn inner_variable_resolves_to_inner_declaration() {
        let tree = parse(SCOPED).unwrap();
        let node = variable_at(&tree, Point::new(3, 5));
        let occ = first_occurrence(&tree, SCOPED, node, "$inner").unwrap();
        assert_eq!(occ.range.start, Position::new(2, 7));
        assert_eq!(occ.range.end, Position::new(2, 13));
    }

    #[test]
    fn outer_variable_resolves_to_root_declaration() {
        let tree = parse(SCOPED).unwrap();
        let node = variable_at(&tree, Point::new(5, 1));
        let occ = first_occurrence(&tree, SCOPED, node, "$outer").unwrap();
        assert_eq!(occ.range.start, Position::new(0, 3));
        assert_eq!(occ.range.end, Position::new(0, 9));
    }

    #[test]
    fn root_walk_skips_sub_bodies() {
        let tree = parse(SCOPED).unwrap();
        let node = variable_at(&tree, Point::new(5, 1));
        let vars = visible_variables(&tree, SCOPED, node);
        assert!(vars.iter().all(|o| o.text != "$inner"));
    }

    #[test]
    fn file_without_blocks_falls_back_to_root() {
        let src = "my $a = 1;\n$a;\n";
        let tree = parse(src).unwrap();
        let node = variable_at(&tree, Point::new(1, 1));
        let occ = first_occurrence(&tree, src, node, "$a").unwrap();
        assert_eq!(occ.range.start.row, 0);
    }

    #[test]
    fn all_occurrences_include_succeeding() {
        let tree = parse(SCOPED).unwrap();
        let node = variable_at(&tree, Point::new(2, 8));
        let occs = all_occurrences(&tree, SCOPED, node, "$inner");
        assert_eq!(occs.len(), 2);
        assert_eq!(occs[0].range.start.row, 2);
        assert_eq!(occs[1].range.start.row, 3);
    }
}
