//! Auto-import synthesis for completion resolve.
//!
//! Rewrites the file's `use`/`no` block into a canonical shape: the
//! `strict`/`warnings` pragmas first, then full imports, then function-only
//! (`qw( … )`) imports, each group sorted and separated by a blank line.
//! The result is one replacement edit spanning the existing import block,
//! and applying it to a file that already contains the import is a no-op.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Position, Range};

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(use|no)\s+([A-Za-z_][A-Za-z0-9_:]*)\s*(?:qw\(\s*([^)]*?)\s*\))?\s*;")
        .expect("import regex")
});

/// Shape of the synthesized import, from `perl.importStyle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportStyle {
    #[default]
    Full,
    FunctionOnly,
}

/// A single text replacement; `range` may be empty for pure insertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdit {
    pub range: Range,
    pub new_text: String,
}

#[derive(Debug, Clone)]
struct ImportLine {
    keyword: String,
    package: String,
    /// `None` for full imports, the qw list for function-only ones.
    functions: Option<Vec<String>>,
    line: u32,
}

impl ImportLine {
    fn render(&self) -> String {
        match &self.functions {
            None => format!("{} {};", self.keyword, self.package),
            Some(fns) => format!("{} {} qw( {} );", self.keyword, self.package, fns.join(" ")),
        }
    }

    fn is_pragma(&self) -> bool {
        matches!(self.package.as_str(), "strict" | "warnings")
    }
}

fn scan_imports(source: &str) -> Vec<ImportLine> {
    let mut imports = Vec::new();
    for (row, line) in source.lines().enumerate() {
        if let Some(caps) = IMPORT_RE.captures(line) {
            let functions = caps.get(3).map(|m| {
                let mut fns: Vec<String> = m
                    .as_str()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                fns.sort();
                fns.dedup();
                fns
            });
            imports.push(ImportLine {
                keyword: caps[1].to_string(),
                package: caps[2].to_string(),
                functions,
                line: row as u32,
            });
        }
    }
    imports
}

/// Compute the edit that makes `function` from `package` importable in
/// `source`. Returns no edits when nothing needs to change and the block is
/// already canonical.
pub fn synthesize_import(
    source: &str,
    package: &str,
    function: &str,
    style: ImportStyle,
) -> Vec<ImportEdit> {
    let mut imports = scan_imports(source);

    match imports.iter().position(|i| i.package == package) {
        Some(idx) => {
            // A full import already covers the package; a function-only one
            // gains the new name.
            if let Some(fns) = imports[idx].functions.as_mut() {
                if !fns.iter().any(|f| f == function) {
                    fns.push(function.to_string());
                    fns.sort();
                }
            }
        }
        None => imports.push(ImportLine {
            keyword: "use".to_string(),
            package: package.to_string(),
            functions: match style {
                ImportStyle::FunctionOnly => Some(vec![function.to_string()]),
                ImportStyle::Full => None,
            },
            line: u32::MAX,
        }),
    }

    let block = render_canonical(&imports);

    let first = imports.iter().map(|i| i.line).min().unwrap_or(u32::MAX);
    if first == u32::MAX {
        // No imports existed; insert the new block at the top of the file.
        let insert = Position::new(0, 0);
        return vec![ImportEdit {
            range: Range::new(insert, insert),
            new_text: format!("{block}\n"),
        }];
    }

    let last = imports
        .iter()
        .map(|i| i.line)
        .filter(|&l| l != u32::MAX)
        .max()
        .unwrap_or(first);
    let last_len = source.lines().nth(last as usize).map(str::len).unwrap_or(0) as u32;

    vec![ImportEdit {
        range: Range::new(Position::new(first, 0), Position::new(last, last_len)),
        new_text: block,
    }]
}

fn render_canonical(imports: &[ImportLine]) -> String {
    let mut pragma_full: Vec<&ImportLine> = Vec::new();
    let mut pragma_fns: Vec<&ImportLine> = Vec::new();
    let mut full: Vec<&ImportLine> = Vec::new();
    let mut fns: Vec<&ImportLine> = Vec::new();

    for import in imports {
        match (import.is_pragma(), import.functions.is_some()) {
            (true, false) => pragma_full.push(import),
            (true, true) => pragma_fns.push(import),
            (false, false) => full.push(import),
            (false, true) => fns.push(import),
        }
    }
    for group in [&mut pragma_full, &mut pragma_fns, &mut full, &mut fns] {
        group.sort_by(|a, b| a.package.cmp(&b.package));
        group.dedup_by(|a, b| a.package == b.package && a.functions == b.functions);
    }

    let pragmas: Vec<String> = pragma_full
        .iter()
        .chain(pragma_fns.iter())
        .map(|i| i.render())
        .collect();
    let groups = [
        pragmas,
        full.iter().map(|i| i.render()).collect(),
        fns.iter().map(|i| i.render()).collect(),
    ];

    groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(|g| g.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Apply edits to text, used by the idempotency tests and by callers that
/// want the rewritten source rather than an edit.
#[cfg(test)]
fn apply_edits(source: &str, edits: &[ImportEdit]) -> String {
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    for edit in edits {
        let start = edit.range.start;
        let end = edit.range.end;
        let prefix = lines
            .get(start.row as usize)
            .map(|l| l[..start.column as usize].to_string())
            .unwrap_or_default();
        let suffix = lines
            .get(end.row as usize)
            .map(|l| l[end.column as usize..].to_string())
            .unwrap_or_default();
        let replacement = format!("{prefix}{}{suffix}", edit.new_text);
        let tail: Vec<String> = lines
            .iter()
            .skip(end.row as usize + 1)
            .cloned()
            .collect();
        lines.truncate(start.row as usize);
        lines.extend(replacement.split('\n').map(str::to_string));
        lines.extend(tail);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_function_only_import() {
        let src = "use strict;\nuse Data::Dumper qw( Dumper );\n\nmy $x = 1;\n";
        let edits = synthesize_import(src, "Foo", "helper", ImportStyle::FunctionOnly);
        assert_eq!(edits.len(), 1);
        assert_eq!(
            edits[0].new_text,
            "use strict;\n\nuse Data::Dumper qw( Dumper );\nuse Foo qw( helper );"
        );
        assert_eq!(edits[0].range.start, Position::new(0, 0));
        assert_eq!(edits[0].range.end.row, 1);
    }

    #[test]
    fn merges_into_existing_qw_list_sorted_and_deduped() {
        let src = "use Foo qw( zeta );\n";
        let edits = synthesize_import(src, "Foo", "alpha", ImportStyle::FunctionOnly);
        assert!(edits[0].new_text.contains("use Foo qw( alpha zeta );"));

        let again = synthesize_import(src, "Foo", "zeta", ImportStyle::FunctionOnly);
        assert!(again[0].new_text.contains("use Foo qw( zeta );"));
    }

    #[test]
    fn full_style_appends_bare_import() {
        let src = "use strict;\n";
        let edits = synthesize_import(src, "Foo::Bar", "helper", ImportStyle::Full);
        assert_eq!(edits[0].new_text, "use strict;\n\nuse Foo::Bar;");
    }

    #[test]
    fn synthesis_is_idempotent() {
        let src = "use strict;\nuse Data::Dumper qw( Dumper );\n\nmy $x = 1;\n";
        let edits = synthesize_import(src, "Foo", "helper", ImportStyle::FunctionOnly);
        let rewritten = apply_edits(src, &edits);

        let second = synthesize_import(&rewritten, "Foo", "helper", ImportStyle::FunctionOnly);
        let again = apply_edits(&rewritten, &second);
        assert_eq!(rewritten, again);
    }

    #[test]
    fn no_imports_inserts_at_top() {
        let src = "my $x = 1;\n";
        let edits = synthesize_import(src, "Foo", "helper", ImportStyle::FunctionOnly);
        assert_eq!(edits[0].range.start, Position::new(0, 0));
        assert_eq!(edits[0].range.end, Position::new(0, 0));
        assert_eq!(edits[0].new_text, "use Foo qw( helper );\n");
    }

    #[test]
    fn pragmas_stay_pinned_in_the_top_group() {
        let src = "use Alpha;\nuse warnings;\nuse strict;\n";
        let edits = synthesize_import(src, "Beta", "b", ImportStyle::FunctionOnly);
        assert_eq!(
            edits[0].new_text,
            "use strict;\nuse warnings;\n\nuse Alpha;\n\nuse Beta qw( b );"
        );
    }

    #[test]
    fn existing_full_import_means_no_addition() {
        let src = "use Foo;\n";
        let edits = synthesize_import(src, "Foo", "helper", ImportStyle::FunctionOnly);
        assert_eq!(edits[0].new_text, "use Foo;");
    }

    #[test]
    fn no_statements_keep_their_keyword() {
        let src = "no warnings;\nuse Foo qw( a );\n";
        let edits = synthesize_import(src, "Foo", "b", ImportStyle::FunctionOnly);
        assert!(edits[0].new_text.contains("no warnings;"));
        assert!(edits[0].new_text.contains("use Foo qw( a b );"));
    }
}
