//! Node-kind classification.
//!
//! Perl tree-sitter grammars have diverged in how they name the same
//! constructs: older artifacts use `function_definition` /
//! `call_expression_*` / `scalar_variable`, the published crate uses
//! `subroutine_declaration_statement` / `function_call_expression` /
//! `scalar`. Everything that keys off a kind string goes through this module
//! so the rest of the analyzer is lineage-agnostic.

/// Subroutine / method declaration nodes. The name identifier is the `name`
/// field.
pub fn is_function_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "function_definition"
            | "subroutine_declaration_statement"
            | "method_declaration_statement"
    )
}

/// Call-site nodes. The callee identifier is one of the [`CALL_NAME_FIELDS`]
/// on the node itself or on its first child.
pub fn is_call_expression(kind: &str) -> bool {
    matches!(
        kind,
        "call_expression_with_args_with_brackets"
            | "call_expression_with_args_without_brackets"
            | "call_expression_with_variable"
            | "call_expression_with_spaced_args"
            | "call_expression_recursive"
            | "method_invocation"
            | "function_call_expression"
            | "method_call_expression"
    )
}

/// Fields that may carry the callee name, in probe order.
pub const CALL_NAME_FIELDS: &[&str] = &["function_name", "function", "method"];

/// Variable nodes: `$scalar`, `@array`, `%hash` and friends.
pub fn is_variable(kind: &str) -> bool {
    kind.ends_with("_variable")
        || matches!(kind, "scalar" | "array" | "hash" | "typeglob")
}

/// Sigil implied by a variable node's kind, used for hover annotations.
pub fn variable_kind_label(kind: &str) -> &'static str {
    if kind.starts_with("scalar") || kind == "special_scalar_variable" {
        "scalar"
    } else if kind.starts_with("array") {
        "array"
    } else if kind.starts_with("hash") {
        "hash"
    } else {
        "variable"
    }
}

pub fn is_block(kind: &str) -> bool {
    kind == "block"
}

pub fn is_package_statement(kind: &str) -> bool {
    kind == "package_statement"
}

/// The bareword holding a package's name inside a `package_statement`.
pub fn is_package_name(kind: &str) -> bool {
    matches!(kind, "package_name" | "package")
}

/// `use` / `no` import statements in either lineage.
pub fn is_use_statement(kind: &str) -> bool {
    matches!(
        kind,
        "use_no_statement"
            | "use_no_if_statement"
            | "use_no_subs_statement"
            | "use_no_feature_statement"
            | "use_no_version"
            | "use_statement"
    )
}

/// Declaration keywords (`my`, `our`, `local`, `state`). Completion is
/// suppressed right after one of these.
pub fn is_scope_keyword(kind: &str, text: &str) -> bool {
    kind == "scope" || matches!(text, "my" | "our" | "local" | "state")
}

/// Kind-contains test used by the references query to decide whether an
/// identifier sits in function position.
pub fn is_function_context(kind: &str) -> bool {
    kind.contains("call_expression")
        || kind.contains("method_invocation")
        || kind.contains("method_call")
        || kind.contains("function_definition")
        || is_function_declaration(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_lineages_classify_declarations() {
        assert!(is_function_declaration("function_definition"));
        assert!(is_function_declaration("subroutine_declaration_statement"));
        assert!(!is_function_declaration("function_call_expression"));
    }

    #[test]
    fn both_lineages_classify_calls() {
        assert!(is_call_expression("call_expression_with_args_with_brackets"));
        assert!(is_call_expression("method_invocation"));
        assert!(is_call_expression("function_call_expression"));
        assert!(!is_call_expression("package_statement"));
    }

    #[test]
    fn variables_match_suffix_and_short_names() {
        assert!(is_variable("scalar_variable"));
        assert!(is_variable("special_scalar_variable"));
        assert!(is_variable("hash"));
        assert!(!is_variable("varname"));
    }

    #[test]
    fn scope_keyword_by_kind_or_text() {
        assert!(is_scope_keyword("scope", "my"));
        assert!(is_scope_keyword("my", "my"));
        assert!(!is_scope_keyword("bareword", "print"));
    }

    #[test]
    fn function_context_covers_declaration_and_calls() {
        assert!(is_function_context("function_call_expression"));
        assert!(is_function_context("call_expression_recursive"));
        assert!(is_function_context("subroutine_declaration_statement"));
        assert!(!is_function_context("block"));
    }
}
