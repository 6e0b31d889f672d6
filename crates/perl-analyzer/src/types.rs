use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tree_sitter::{Node, Point};

/// Zero-based position. `column` counts bytes within the line, matching
/// tree-sitter's `Point`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: u32,
    pub column: u32,
}

impl Position {
    pub fn new(row: u32, column: u32) -> Self {
        Position { row, column }
    }

    pub fn to_point(self) -> Point {
        Point::new(self.row as usize, self.column as usize)
    }
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Position {
            row: p.row as u32,
            column: p.column as u32,
        }
    }
}

/// Half-open range of positions, `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range { start, end }
    }

    pub fn of_node(node: &Node) -> Self {
        Range {
            start: node.start_position().into(),
            end: node.end_position().into(),
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }
}

/// The canonical index record. Declarations and call sites share this shape;
/// `position` always covers the name identifier, not the enclosing construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionReference {
    pub uri: String,
    pub function_name: String,
    pub package_name: String,
    pub position: Range,
}

/// Result of one extraction pass over a single document.
#[derive(Debug, Clone, Default)]
pub struct PerFileIndex {
    pub declarations: Vec<FunctionReference>,
    pub references: HashMap<String, Vec<FunctionReference>>,
}

/// A syntactic problem found while walking a parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub range: Range,
    pub message: String,
}

/// A resolved location inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_ordering_is_row_major() {
        assert!(Position::new(1, 0) > Position::new(0, 99));
        assert!(Position::new(2, 3) < Position::new(2, 4));
    }

    #[test]
    fn range_contains_is_half_open() {
        let r = Range::new(Position::new(1, 4), Position::new(1, 9));
        assert!(r.contains(Position::new(1, 4)));
        assert!(r.contains(Position::new(1, 8)));
        assert!(!r.contains(Position::new(1, 9)));
    }

    #[test]
    fn function_reference_serializes_camel_case() {
        let r = FunctionReference {
            uri: "file:///a.pm".to_string(),
            function_name: "greet".to_string(),
            package_name: "Foo::Bar".to_string(),
            position: Range::new(Position::new(1, 4), Position::new(1, 9)),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("functionName").is_some());
        assert!(json.get("packageName").is_some());
        assert!(json.get("position").is_some());
    }
}
