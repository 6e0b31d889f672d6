//! Incremental text synchronization and position mapping.
//!
//! LSP positions count UTF-16 code units; the analyzer (and tree-sitter)
//! count bytes. Inbound positions and change ranges go through the UTF-16
//! aware mapping here.

use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent};
use tree_sitter::Point;

/// Byte offset of an LSP position within `text`.
fn position_to_offset(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (row, line) in text.split_inclusive('\n').enumerate() {
        if row == position.line as usize {
            let mut utf16 = 0u32;
            for (byte_idx, ch) in line.char_indices() {
                if utf16 >= position.character {
                    return offset + byte_idx;
                }
                utf16 += ch.len_utf16() as u32;
            }
            return offset + line.trim_end_matches(['\n', '\r']).len();
        }
        offset += line.len();
    }
    text.len()
}

/// Tree-sitter point (byte column) of an LSP position.
pub fn position_to_point(text: &str, position: Position) -> Point {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(position.line as usize)
        .map(str::len)
        .sum();
    let offset = position_to_offset(text, position);
    Point::new(position.line as usize, offset - line_start)
}

/// Apply one LSP content change. A change without a range replaces the
/// whole document (full sync fallback).
pub fn apply_content_change(text: &mut String, change: &TextDocumentContentChangeEvent) {
    match change.range {
        Some(range) => {
            let start = position_to_offset(text, range.start);
            let end = position_to_offset(text, range.end).max(start);
            text.replace_range(start..end, &change.text);
        }
        None => *text = change.text.clone(),
    }
}

/// Analyzer position (byte columns) to LSP position.
pub fn to_lsp_position(pos: perl_analyzer::Position) -> Position {
    Position {
        line: pos.row,
        character: pos.column,
    }
}

pub fn to_lsp_range(range: perl_analyzer::Range) -> Range {
    Range {
        start: to_lsp_position(range.start),
        end: to_lsp_position(range.end),
    }
}
