//! The workspace index: per-URI trees, declarations and references, with
//! the client-selectable tree cache policy.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;
use tree_sitter::Tree;
use url::Url;

use crate::error::AnalyzerError;
use crate::extract::{extract_symbols, syntax_diagnostics};
use crate::parser;
use crate::types::{Diagnostic, FunctionReference};

/// Tree retention policy. Declarations and references are always retained;
/// the strategy only governs `trees_by_uri`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachingStrategy {
    /// Keep trees only for URIs opened in the editor; workspace-scan parses
    /// are discarded after extraction.
    #[default]
    Eager,
    /// Keep a tree for every analyzed URI.
    Full,
}

impl CachingStrategy {
    pub fn from_setting(value: &str) -> Self {
        match value {
            "full" => CachingStrategy::Full,
            _ => CachingStrategy::Eager,
        }
    }
}

/// How a document reached the analyzer. `OnFileOpen` forces tree retention
/// even under the eager strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    OnFileOpen,
    OnWorkspaceOpen,
}

#[derive(Debug)]
struct CachedDocument {
    tree: Tree,
    text: String,
}

/// Global mappings over the workspace. One logical writer at a time; the
/// embedding server serializes `analyze`/`close`/`load` behind its own lock.
#[derive(Debug, Default)]
pub struct WorkspaceIndex {
    strategy: CachingStrategy,
    documents: HashMap<String, CachedDocument>,
    decls: HashMap<String, Vec<FunctionReference>>,
    refs: HashMap<String, HashMap<String, Vec<FunctionReference>>>,
    /// URIs in first-analysis order; definition results are reported in
    /// insertion order across URIs.
    order: Vec<String>,
}

impl WorkspaceIndex {
    pub fn new(strategy: CachingStrategy) -> Self {
        WorkspaceIndex {
            strategy,
            ..Default::default()
        }
    }

    pub fn set_strategy(&mut self, strategy: CachingStrategy) {
        self.strategy = strategy;
    }

    /// Parse and extract one document, replacing any previous entries for
    /// its URI. Returns syntax diagnostics, at most `problem_limit` of
    /// them, and none at all when `collect_diagnostics` is off.
    pub fn analyze(
        &mut self,
        uri: &str,
        text: &str,
        mode: AnalysisMode,
        collect_diagnostics: bool,
        problem_limit: usize,
    ) -> Result<Vec<Diagnostic>, AnalyzerError> {
        let tree = parser::parse(text)?;
        let extracted = extract_symbols(uri, &tree, text);

        let diagnostics = if collect_diagnostics {
            syntax_diagnostics(&tree, text, problem_limit)
        } else {
            Vec::new()
        };

        if !self.decls.contains_key(uri) && !self.refs.contains_key(uri) {
            self.order.push(uri.to_string());
        }
        self.decls.insert(uri.to_string(), extracted.declarations);
        self.refs.insert(uri.to_string(), extracted.references);

        let retain_tree = match mode {
            AnalysisMode::OnFileOpen => true,
            AnalysisMode::OnWorkspaceOpen => self.strategy == CachingStrategy::Full,
        };
        if retain_tree {
            self.documents.insert(
                uri.to_string(),
                CachedDocument {
                    tree,
                    text: text.to_string(),
                },
            );
        } else {
            self.documents.remove(uri);
        }

        Ok(diagnostics)
    }

    /// Tree and text for a URI. Cache miss reads the file from disk and
    /// re-inserts only when the strategy permits.
    pub fn document_for(&mut self, uri: &str) -> Result<(Tree, String), AnalyzerError> {
        if let Some(doc) = self.documents.get(uri) {
            return Ok((parser::copy(&doc.tree), doc.text.clone()));
        }
        let path = uri_to_path(uri)?;
        let text = std::fs::read_to_string(&path)
            .map_err(|source| AnalyzerError::Unreadable { path, source })?;
        let tree = parser::parse(&text)?;
        if self.strategy == CachingStrategy::Full {
            self.documents.insert(
                uri.to_string(),
                CachedDocument {
                    tree: parser::copy(&tree),
                    text: text.clone(),
                },
            );
        }
        Ok((tree, text))
    }

    /// Evict every entry for a URI, leaving no dangling references.
    pub fn close(&mut self, uri: &str) {
        self.documents.remove(uri);
        self.decls.remove(uri);
        self.refs.remove(uri);
        self.order.retain(|u| u != uri);
        debug!(uri, "evicted from index");
    }

    /// Declarations for one URI.
    pub fn declarations(&self, uri: &str) -> &[FunctionReference] {
        self.decls.get(uri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(uri, declarations)` pairs in insertion order.
    pub fn declarations_by_uri(
        &self,
    ) -> impl Iterator<Item = (&str, &[FunctionReference])> + '_ {
        self.order.iter().filter_map(move |uri| {
            self.decls
                .get(uri)
                .map(|d| (uri.as_str(), d.as_slice()))
        })
    }

    /// `(uri, name -> references)` pairs in insertion order.
    pub fn references_by_uri(
        &self,
    ) -> impl Iterator<Item = (&str, &HashMap<String, Vec<FunctionReference>>)> + '_ {
        self.order
            .iter()
            .filter_map(move |uri| self.refs.get(uri).map(|r| (uri.as_str(), r)))
    }

    pub fn references_in(&self, uri: &str) -> Option<&HashMap<String, Vec<FunctionReference>>> {
        self.refs.get(uri)
    }

    pub fn is_indexed(&self, uri: &str) -> bool {
        self.decls.contains_key(uri) || self.refs.contains_key(uri)
    }

    pub fn indexed_uri_count(&self) -> usize {
        self.order.len()
    }

    /// Persist the cold cache (declarations + references) to the workspace
    /// sidecar.
    pub fn save(&self, workspace_root: &std::path::Path) -> Result<(), AnalyzerError> {
        crate::persist::save(workspace_root, &self.decls, &self.refs)
    }

    /// Load a previously persisted cold cache. Returns whether anything was
    /// loaded; decode failures surface as errors for the caller to log.
    pub fn load(&mut self, workspace_root: &std::path::Path) -> Result<bool, AnalyzerError> {
        match crate::persist::load(workspace_root)? {
            Some((decls, refs)) => {
                self.order = decls.keys().cloned().collect();
                self.order.sort();
                for uri in refs.keys() {
                    if !decls.contains_key(uri) {
                        self.order.push(uri.clone());
                    }
                }
                self.decls = decls;
                self.refs = refs;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// `file://` URI to filesystem path.
pub fn uri_to_path(uri: &str) -> Result<PathBuf, AnalyzerError> {
    let url = Url::parse(uri).map_err(|_| AnalyzerError::InvalidUri(uri.to_string()))?;
    url.to_file_path()
        .map_err(|_| AnalyzerError::InvalidUri(uri.to_string()))
}

/// Filesystem path to `file://` URI.
pub fn path_to_uri(path: &std::path::Path) -> Result<String, AnalyzerError> {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| AnalyzerError::InvalidUri(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI_A: &str = "file:///ws/a.pm";
    const URI_B: &str = "file:///ws/b.pl";

    const SRC_A: &str = "package Foo::Bar;\nsub greet { return \"hi\"; }\n1;\n";
    const SRC_B: &str = "Foo::Bar::greet();\n";

    fn indexed() -> WorkspaceIndex {
        let mut index = WorkspaceIndex::new(CachingStrategy::Eager);
        index
            .analyze(URI_A, SRC_A, AnalysisMode::OnWorkspaceOpen, true, 100)
            .unwrap();
        index
            .analyze(URI_B, SRC_B, AnalysisMode::OnWorkspaceOpen, true, 100)
            .unwrap();
        index
    }

    #[test]
    fn declarations_and_references_are_keyed_by_uri() {
        let index = indexed();
        assert_eq!(index.declarations(URI_A).len(), 1);
        assert!(index.declarations(URI_A).iter().all(|r| r.uri == URI_A));
        let refs = index.references_in(URI_B).unwrap();
        assert!(refs["greet"].iter().all(|r| r.function_name == "greet"));
    }

    #[test]
    fn reanalysis_replaces_previous_extraction() {
        let mut index = indexed();
        index
            .analyze(URI_A, "sub other { 1 }\n", AnalysisMode::OnFileOpen, true, 100)
            .unwrap();
        let decls = index.declarations(URI_A);
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].function_name, "other");
    }

    #[test]
    fn close_removes_every_entry() {
        let mut index = indexed();
        index.close(URI_A);
        assert!(index.declarations(URI_A).is_empty());
        assert!(index.references_in(URI_A).is_none());
        assert!(!index.is_indexed(URI_A));
        assert!(index
            .declarations_by_uri()
            .all(|(uri, _)| uri != URI_A));
    }

    #[test]
    fn eager_strategy_discards_scan_trees_but_keeps_open_ones() {
        let mut index = WorkspaceIndex::new(CachingStrategy::Eager);
        index
            .analyze(URI_A, SRC_A, AnalysisMode::OnWorkspaceOpen, false, 0)
            .unwrap();
        assert!(index.documents.get(URI_A).is_none());
        index
            .analyze(URI_A, SRC_A, AnalysisMode::OnFileOpen, false, 0)
            .unwrap();
        assert!(index.documents.get(URI_A).is_some());
    }

    #[test]
    fn full_strategy_retains_scan_trees() {
        let mut index = WorkspaceIndex::new(CachingStrategy::Full);
        index
            .analyze(URI_A, SRC_A, AnalysisMode::OnWorkspaceOpen, false, 0)
            .unwrap();
        assert!(index.documents.get(URI_A).is_some());
    }

    #[test]
    fn document_for_serves_cached_text() {
        let mut index = WorkspaceIndex::new(CachingStrategy::Eager);
        index
            .analyze(URI_A, SRC_A, AnalysisMode::OnFileOpen, false, 0)
            .unwrap();
        let (tree, text) = index.document_for(URI_A).unwrap();
        assert_eq!(text, SRC_A);
        assert_eq!(tree.root_node().kind(), "source_file");
    }

    #[test]
    fn insertion_order_is_preserved_across_uris() {
        let index = indexed();
        let uris: Vec<&str> = index.declarations_by_uri().map(|(u, _)| u).collect();
        assert_eq!(uris, vec![URI_A, URI_B]);
    }

    #[test]
    fn uri_path_round_trip() {
        let path = uri_to_path("file:///tmp/x.pm").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.pm"));
        assert_eq!(path_to_uri(&path).unwrap(), "file:///tmp/x.pm");
    }
}
