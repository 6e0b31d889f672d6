//! Pure parsers for `perl -d` output: stack traces, variable listings and
//! nested value dumps. The debugger has no structured output mode; all of
//! this is prompt- and indentation-delimited text.

use std::sync::LazyLock;

use regex::Regex;

/// The ready prompt, `DB<1> ` (note the trailing whitespace).
pub static PROMPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DB<\d+>\s$").expect("prompt regex"));

static FRAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([@$.])\s*=\s*(.+?)\s+called\s+from\s+file\s+'(.+?)'\s+line\s+(\d+)")
        .expect("frame regex")
});

static FRAME_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[@$.]\s*=").expect("frame start regex"));

static FRAME_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"called\s+from\s+file\s+'.+?'\s+line\s+\d+").expect("frame end"));

static TRAILING_PROMPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*DB<\d+>.*$").expect("trailing prompt regex"));

static HASH_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+=)?HASH\(0x[0-9a-f]+\)").expect("hash addr regex"));

static ARRAY_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ARRAY\(0x[0-9a-f]+\)").expect("array addr regex"));

static SCALAR_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SCALAR\(0x[0-9a-f]+\)").expect("scalar addr regex"));

/// Calling context of a stack frame, from the sigil in `T` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameContext {
    Array,
    Scalar,
    Void,
    Unknown,
}

impl FrameContext {
    fn from_sigil(sigil: &str) -> Self {
        match sigil {
            "@" => FrameContext::Array,
            "$" => FrameContext::Scalar,
            "." => FrameContext::Void,
            _ => FrameContext::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameContext::Array => "array",
            FrameContext::Scalar => "scalar",
            FrameContext::Void => "void",
            FrameContext::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub context: FrameContext,
    pub callee: String,
    pub caller_file: String,
    pub line: u32,
}

/// Parse the body of a `T` reply. Long frames wrap across lines, so logical
/// frames are reassembled first: a frame starts at `@ =` / `$ =` / `. =`
/// and ends once the `called from file '…' line N` suffix has appeared.
pub fn parse_stack_trace(reply: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut logical: Option<String> = None;

    for line in reply.lines() {
        if FRAME_START_RE.is_match(line) {
            logical = Some(line.to_string());
        } else if let Some(buf) = logical.as_mut() {
            buf.push(' ');
            buf.push_str(line.trim());
        }

        if let Some(buf) = &logical {
            if FRAME_END_RE.is_match(buf) {
                if let Some(caps) = FRAME_RE.captures(buf) {
                    frames.push(StackFrame {
                        context: FrameContext::from_sigil(&caps[1]),
                        callee: caps[2].to_string(),
                        caller_file: caps[3].to_string(),
                        line: caps[4].parse().unwrap_or(0),
                    });
                }
                logical = None;
            }
        }
    }
    frames
}

/// One `name = value` entry from a `y` or `V` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry {
    pub name: String,
    pub value: String,
}

/// Split a `y`/`V` reply into entries. An entry begins at a line whose first
/// character is a sigil and runs until the next such line or the trailing
/// prompt line.
pub fn split_variable_entries(reply: &str) -> Vec<VarEntry> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();

    for line in reply.lines() {
        if line.trim_start().starts_with("DB<") && line.trim_end().ends_with('>') {
            break;
        }
        let starts_entry = matches!(line.chars().next(), Some('$' | '@' | '%'));
        if starts_entry {
            blocks.push(vec![line]);
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }

    blocks
        .into_iter()
        .filter_map(|lines| {
            let joined = lines.join("\n");
            let split_at = joined.find("= ")?;
            let name = joined[..split_at].trim().to_string();
            let value = joined[split_at + 2..].to_string();
            Some(VarEntry { name, value })
        })
        .collect()
}

/// Parse a multi-line array dump: `(` … `)` with numeric indices at a fixed
/// indentation and continuation lines indented deeper. Continuations are
/// re-joined after stripping the base indentation.
pub fn parse_array_dump(raw: &str) -> Vec<String> {
    parse_dump_entries(raw)
        .into_iter()
        .map(|(_, value)| value)
        .collect()
}

/// Parse a multi-line hash dump: `key => value` pairs at a fixed
/// indentation. Keys lose their surrounding quotes.
pub fn parse_hash_dump(raw: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut base_indent: Option<usize> = None;
    let mut current: Option<(String, String)> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "(" || trimmed == ")" {
            continue;
        }
        if HASH_ADDR_RE.is_match(trimmed) && !trimmed.contains("=>") && current.is_none() {
            // Leading `HASH(0x…)` header of a nested payload.
            continue;
        }
        let indent = line.len() - line.trim_start().len();
        let at_top = match base_indent {
            Some(b) => indent <= b,
            None => true,
        };
        if at_top && trimmed.contains(" => ") {
            if let Some(entry) = current.take() {
                out.push(entry);
            }
            base_indent.get_or_insert(indent);
            let (key, value) = trimmed.split_once(" => ").unwrap_or((trimmed, ""));
            current = Some((strip_quotes(key).to_string(), strip_quotes(value).to_string()));
        } else if let Some((_, value)) = current.as_mut() {
            let base = base_indent.unwrap_or(0);
            value.push('\n');
            value.push_str(&line[base.min(line.len())..]);
        }
    }
    if let Some(entry) = current {
        out.push(entry);
    }
    out
}

fn strip_quotes(s: &str) -> &str {
    s.strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .unwrap_or(s)
}

fn parse_dump_entries(raw: &str) -> Vec<(u32, String)> {
    static INDEX_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\s*)(\d+)\s+(.*)$").expect("index regex"));

    let mut out: Vec<(u32, String)> = Vec::new();
    let mut base_indent: Option<usize> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed == "(" || trimmed == ")" || trimmed.is_empty() {
            continue;
        }
        let caps = INDEX_RE.captures(line);
        let top_level = caps.as_ref().is_some_and(|c| match base_indent {
            Some(b) => c[1].len() == b,
            None => true,
        });
        if top_level {
            let caps = caps.unwrap();
            base_indent.get_or_insert(caps[1].len());
            out.push((caps[2].parse().unwrap_or(0), caps[3].to_string()));
        } else if let Some((_, value)) = out.last_mut() {
            let base = base_indent.unwrap_or(0);
            value.push('\n');
            value.push_str(&line[base.min(line.len())..]);
        }
    }
    out
}

/// Length a prettified array reports: highest top-level index plus one.
pub fn array_dump_len(raw: &str) -> usize {
    parse_dump_entries(raw)
        .iter()
        .map(|(i, _)| *i as usize + 1)
        .max()
        .unwrap_or(0)
}

/// Shape of a dumped value, for handle minting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Hash,
    Array,
    Scalar,
    Leaf,
}

pub fn classify_value(value: &str) -> ValueKind {
    if HASH_ADDR_RE.is_match(value) {
        ValueKind::Hash
    } else if ARRAY_ADDR_RE.is_match(value) {
        ValueKind::Array
    } else if SCALAR_ADDR_RE.is_match(value) {
        ValueKind::Scalar
    } else {
        ValueKind::Leaf
    }
}

/// Strip a `SCALAR(0x…)` header and `->` arrows from an indirection dump,
/// leaving the pointed-at rendering.
pub fn strip_scalar_indirection(raw: &str) -> String {
    raw.lines()
        .filter(|l| !SCALAR_ADDR_RE.is_match(l.trim()))
        .map(|l| l.trim().strip_prefix("-> ").unwrap_or(l.trim()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Clean an `x expr` reply: drop the trailing prompt, then either keep the
/// array dump (for `@…` expressions) or remove the `0 ` index marker the
/// debugger adds in scalar context.
pub fn parse_evaluate_result(expr: &str, reply: &str) -> String {
    static LEADING_INDEX_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^0\s+").expect("leading index regex"));

    let cleaned = TRAILING_PROMPT_RE.replace(reply, "");
    let cleaned = cleaned.trim_end_matches(['\n', ' ']);
    if expr.trim_start().starts_with('@') {
        cleaned.to_string()
    } else {
        LEADING_INDEX_RE.replace(cleaned.trim_start(), "").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_matches_with_trailing_space() {
        assert!(PROMPT_RE.is_match("  DB<2> "));
        assert!(PROMPT_RE.is_match("DB<17>\t"));
        assert!(!PROMPT_RE.is_match("DB<2>"));
    }

    #[test]
    fn parses_single_frame() {
        let reply = "$ = main::fib(8) called from file 'fib.pl' line 12\n";
        let frames = parse_stack_trace(reply);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].context, FrameContext::Scalar);
        assert_eq!(frames[0].callee, "main::fib(8)");
        assert_eq!(frames[0].caller_file, "fib.pl");
        assert_eq!(frames[0].line, 12);
    }

    #[test]
    fn reassembles_wrapped_frames() {
        let reply = "@ = Foo::Bar::long_call(1,\n  2, 3) called from file 'a.pm' line 7\n";
        let frames = parse_stack_trace(reply);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].context, FrameContext::Array);
        assert!(frames[0].callee.contains("long_call"));
        assert_eq!(frames[0].line, 7);
    }

    #[test]
    fn k_frames_plus_noise_yield_k_frames() {
        let reply = "\
$ = main::a() called from file 's.pl' line 3
. = main::b() called from file 's.pl' line 9
@ = main::c(1) called from file 'lib/T.pm' line 44
some trailing banner noise
  DB<3> ";
        let frames = parse_stack_trace(reply);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1].context, FrameContext::Void);
        assert_eq!(frames[2].caller_file, "lib/T.pm");
    }

    #[test]
    fn sigil_mapping_covers_unknown() {
        assert_eq!(FrameContext::from_sigil("@"), FrameContext::Array);
        assert_eq!(FrameContext::from_sigil("$"), FrameContext::Scalar);
        assert_eq!(FrameContext::from_sigil("."), FrameContext::Void);
        assert_eq!(FrameContext::from_sigil("?"), FrameContext::Unknown);
    }

    #[test]
    fn splits_simple_variable_entries() {
        let reply = "$x = 42\n@list = (\n  0  'a'\n  1  'b'\n)\n%h = (\n  'k' => 'v'\n)\n  DB<2> ";
        let entries = split_variable_entries(reply);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "$x");
        assert_eq!(entries[0].value, "42");
        assert_eq!(entries[1].name, "@list");
        assert!(entries[1].value.starts_with('('));
        assert!(entries[1].value.contains("0  'a'"));
        assert_eq!(entries[2].name, "%h");
    }

    #[test]
    fn variable_entry_value_splits_on_first_equals() {
        let reply = "$eq = \"a = b\"\n  DB<4> ";
        let entries = split_variable_entries(reply);
        assert_eq!(entries[0].name, "$eq");
        assert_eq!(entries[0].value, "\"a = b\"");
    }

    #[test]
    fn parses_flat_array_dump() {
        let raw = "(\n  0  1\n  1  'two'\n  2  3.5\n)";
        let values = parse_array_dump(raw);
        assert_eq!(values, vec!["1", "'two'", "3.5"]);
        assert_eq!(array_dump_len(raw), 3);
    }

    #[test]
    fn nested_hash_value_keeps_continuation_lines() {
        let raw = "(\n  0  1\n  1  HASH(0x1)\n     'k' => 'v'\n)";
        let values = parse_array_dump(raw);
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], "1");
        assert_eq!(values[1], "HASH(0x1)\n   'k' => 'v'");
        assert_eq!(array_dump_len(raw), 2);
    }

    #[test]
    fn parses_hash_dump_stripping_key_quotes() {
        let raw = "HASH(0x1)\n   'k' => 'v'";
        let pairs = parse_hash_dump(raw);
        assert_eq!(pairs, vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn parses_multi_entry_hash_dump() {
        let raw = "(\n  'alpha' => 1\n  'beta' => ARRAY(0x2)\n     0  'x'\n)";
        let pairs = parse_hash_dump(raw);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("alpha".to_string(), "1".to_string()));
        assert_eq!(pairs[1].0, "beta");
        assert!(pairs[1].1.starts_with("ARRAY(0x2)"));
        assert!(pairs[1].1.contains("0  'x'"));
    }

    #[test]
    fn classifies_values_including_blessed() {
        assert_eq!(classify_value("HASH(0x55e8)"), ValueKind::Hash);
        assert_eq!(classify_value("Foo=HASH(0x55e8)"), ValueKind::Hash);
        assert_eq!(classify_value("ARRAY(0x1f)"), ValueKind::Array);
        assert_eq!(classify_value("SCALAR(0x2a)"), ValueKind::Scalar);
        assert_eq!(classify_value("42"), ValueKind::Leaf);
        assert_eq!(classify_value("'HASH-like string'"), ValueKind::Leaf);
    }

    #[test]
    fn strips_scalar_indirection() {
        assert_eq!(strip_scalar_indirection("SCALAR(0x2a)\n-> 42"), "42");
        assert_eq!(strip_scalar_indirection("-> 'deep'"), "'deep'");
    }

    #[test]
    fn evaluate_scalar_drops_index_marker_and_prompt() {
        let out = parse_evaluate_result("$x", "0  42\n  DB<5> ");
        assert_eq!(out, "42");
    }

    #[test]
    fn evaluate_array_keeps_dump() {
        let out = parse_evaluate_result("@xs", "0  1\n1  2\n  DB<6> ");
        assert_eq!(out, "0  1\n1  2");
    }
}
