//! tower-lsp backend wiring editor requests to the workspace analyzer.

pub mod settings;
pub mod sync;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use globset::GlobMatcher;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::notification::Progress;
use tower_lsp::lsp_types::request::WorkDoneProgressCreate;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, info, warn};
use tree_sitter::Tree;

use perl_analyzer::index::path_to_uri;
use perl_analyzer::{imports, query, AnalysisMode, WorkspaceIndex};

use settings::PerlSettings;
use sync::{apply_content_change, position_to_point, to_lsp_range};

/// File pattern for the workspace scan; `GLOB_PATTERN` overrides it.
pub const DEFAULT_GLOB: &str = "**/*.{pl,pm,t,esp}";

const PROGRESS_TOKEN: &str = "perl-ide/indexing";

/// Client capabilities negotiated at initialize.
#[derive(Debug, Clone, Copy, Default)]
struct NegotiatedCaps {
    configuration: bool,
    workspace_folders: bool,
    related_information: bool,
}

struct ServerState {
    /// Open document texts, updated by incremental sync.
    documents: RwLock<HashMap<Url, String>>,
    index: RwLock<WorkspaceIndex>,
    /// Per-document settings cache, cleared on didChangeConfiguration.
    settings: RwLock<HashMap<Url, PerlSettings>>,
    caps: RwLock<NegotiatedCaps>,
    roots: RwLock<Vec<PathBuf>>,
}

pub struct Backend {
    client: Client,
    state: Arc<ServerState>,
}

/// Payload a completion item carries into resolve.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionData {
    uri: Url,
    package_name: String,
    function_name: String,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Backend {
            client,
            state: Arc::new(ServerState {
                documents: RwLock::new(HashMap::new()),
                index: RwLock::new(WorkspaceIndex::default()),
                settings: RwLock::new(HashMap::new()),
                caps: RwLock::new(NegotiatedCaps::default()),
                roots: RwLock::new(Vec::new()),
            }),
        }
    }

    async fn settings_for(&self, uri: &Url) -> PerlSettings {
        if let Some(cached) = self.state.settings.read().await.get(uri) {
            return cached.clone();
        }
        let supports = self.state.caps.read().await.configuration;
        let settings = fetch_settings(&self.client, supports, Some(uri.clone())).await;
        self.state
            .index
            .write()
            .await
            .set_strategy(settings.caching.into());
        self.state
            .settings
            .write()
            .await
            .insert(uri.clone(), settings.clone());
        settings
    }

    /// Tree and text for a URI, from the cache or disk.
    async fn document_state(&self, uri: &Url) -> Option<(Tree, String)> {
        match self.state.index.write().await.document_for(uri.as_str()) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(%uri, "no document state: {e}");
                None
            }
        }
    }

    async fn analyze_and_publish(&self, uri: Url, text: &str, mode: AnalysisMode) {
        let settings = self.settings_for(&uri).await;
        let collect = match mode {
            AnalysisMode::OnFileOpen => true,
            AnalysisMode::OnWorkspaceOpen => settings.show_all_errors,
        };
        let result = self.state.index.write().await.analyze(
            uri.as_str(),
            text,
            mode,
            collect,
            settings.max_number_of_problems,
        );
        match result {
            Ok(diags) => {
                self.client
                    .publish_diagnostics(uri, to_lsp_diagnostics(&diags), None)
                    .await;
            }
            Err(e) => warn!(%uri, "analysis failed: {e}"),
        }
    }
}

async fn fetch_settings(client: &Client, supports_config: bool, scope: Option<Url>) -> PerlSettings {
    if !supports_config {
        return PerlSettings::default();
    }
    let items = vec![ConfigurationItem {
        scope_uri: scope,
        section: Some("perl".to_string()),
    }];
    match client.configuration(items).await {
        Ok(values) => values
            .into_iter()
            .next()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default(),
        Err(e) => {
            debug!("workspace/configuration failed: {e}");
            PerlSettings::default()
        }
    }
}

fn to_lsp_diagnostics(diags: &[perl_analyzer::Diagnostic]) -> Vec<Diagnostic> {
    diags
        .iter()
        .map(|d| Diagnostic {
            range: to_lsp_range(d.range),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some("perl".to_string()),
            message: d.message.clone(),
            ..Default::default()
        })
        .collect()
}

fn scan_matcher() -> GlobMatcher {
    let pattern = std::env::var("GLOB_PATTERN").unwrap_or_else(|_| DEFAULT_GLOB.to_string());
    globset::Glob::new(&pattern)
        .unwrap_or_else(|e| {
            warn!("invalid GLOB_PATTERN ({e}), using default");
            globset::Glob::new(DEFAULT_GLOB).expect("default glob compiles")
        })
        .compile_matcher()
}

/// The workspace scan: load the persisted index, walk every folder, analyze
/// each matching file, stream progress, persist the result.
async fn scan_workspace(client: Client, state: Arc<ServerState>) {
    let roots = state.roots.read().await.clone();
    let Some(primary_root) = roots.first().cloned() else {
        info!("no workspace folders; skipping scan");
        return;
    };

    let loaded = {
        let mut index = state.index.write().await;
        match index.load(&primary_root) {
            Ok(found) => found,
            Err(e) => {
                info!("persisted index unusable, starting empty: {e}");
                false
            }
        }
    };
    let title = if loaded {
        "Re-indexing"
    } else {
        "(Please wait) Indexing"
    };

    let token = NumberOrString::String(PROGRESS_TOKEN.to_string());
    let _ = client
        .send_request::<WorkDoneProgressCreate>(WorkDoneProgressCreateParams {
            token: token.clone(),
        })
        .await;
    progress(&client, token.clone(), WorkDoneProgress::Begin(WorkDoneProgressBegin {
        title: title.to_string(),
        cancellable: Some(false),
        message: None,
        percentage: Some(0),
    }))
    .await;

    let matcher = scan_matcher();
    let mut files: Vec<PathBuf> = Vec::new();
    for root in &roots {
        for entry in walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if matcher.is_match(relative) {
                files.push(entry.path().to_path_buf());
            }
        }
    }

    let supports = state.caps.read().await.configuration;
    let settings = fetch_settings(&client, supports, None).await;
    state
        .index
        .write()
        .await
        .set_strategy(settings.caching.into());
    let max_problems = settings.max_number_of_problems;
    let mut problems = 0usize;

    let total = files.len();
    info!(total, "workspace scan started");
    for (processed, path) in files.iter().enumerate() {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable file: {e}");
                continue;
            }
        };
        let Ok(uri) = path_to_uri(path) else { continue };

        let collect = settings.show_all_errors && problems <= max_problems;
        let remaining = max_problems.saturating_sub(problems);
        let result = state.index.write().await.analyze(
            &uri,
            &text,
            AnalysisMode::OnWorkspaceOpen,
            collect,
            remaining,
        );
        match result {
            Ok(diags) => {
                problems += diags.len();
                if collect {
                    if let Ok(url) = Url::parse(&uri) {
                        client
                            .publish_diagnostics(url, to_lsp_diagnostics(&diags), None)
                            .await;
                    }
                }
            }
            Err(e) => warn!(uri, "scan analysis failed: {e}"),
        }

        let pct = ((processed + 1) as f64 / total.max(1) as f64 * 100.0).round() as u32;
        progress(&client, token.clone(), WorkDoneProgress::Report(WorkDoneProgressReport {
            cancellable: Some(false),
            message: None,
            percentage: Some(pct),
        }))
        .await;
    }

    progress(&client, token, WorkDoneProgress::End(WorkDoneProgressEnd { message: None })).await;

    if let Err(e) = state.index.read().await.save(&primary_root) {
        warn!("failed to persist index: {e}");
    }
    info!("workspace scan finished");
}

async fn progress(client: &Client, token: NumberOrString, value: WorkDoneProgress) {
    client
        .send_notification::<Progress>(ProgressParams {
            token,
            value: ProgressParamsValue::WorkDone(value),
        })
        .await;
}

fn to_location(loc: &perl_analyzer::Location) -> Option<Location> {
    Some(Location {
        uri: Url::parse(&loc.uri).ok()?,
        range: to_lsp_range(loc.range),
    })
}

#[allow(deprecated)]
fn to_document_symbol(decl: &perl_analyzer::FunctionReference) -> DocumentSymbol {
    let range = to_lsp_range(decl.position);
    DocumentSymbol {
        name: decl.function_name.clone(),
        detail: (!decl.package_name.is_empty()).then(|| decl.package_name.clone()),
        kind: SymbolKind::FUNCTION,
        tags: None,
        deprecated: None,
        range,
        selection_range: range,
        children: None,
    }
}

#[allow(deprecated)]
fn to_symbol_information(decl: &perl_analyzer::FunctionReference) -> Option<SymbolInformation> {
    Some(SymbolInformation {
        name: decl.function_name.clone(),
        kind: SymbolKind::FUNCTION,
        tags: None,
        deprecated: None,
        location: Location {
            uri: Url::parse(&decl.uri).ok()?,
            range: to_lsp_range(decl.position),
        },
        container_name: (!decl.package_name.is_empty()).then(|| decl.package_name.clone()),
    })
}

fn completion_item(candidate: &query::CompletionCandidate, uri: &Url) -> CompletionItem {
    let kind = match candidate.kind {
        query::CandidateKind::Variable => CompletionItemKind::VARIABLE,
        query::CandidateKind::Function => CompletionItemKind::FUNCTION,
        query::CandidateKind::Package => CompletionItemKind::MODULE,
    };
    let data = candidate.resolve.as_ref().and_then(|r| {
        serde_json::to_value(CompletionData {
            uri: uri.clone(),
            package_name: r.package_name.clone(),
            function_name: r.function_name.clone(),
        })
        .ok()
    });
    CompletionItem {
        label: candidate.label.clone(),
        kind: Some(kind),
        insert_text: Some(candidate.insert_text.clone()),
        sort_text: Some(format!(
            "{}{}",
            if candidate.from_current_file { "0" } else { "1" },
            candidate.label
        )),
        data,
        ..Default::default()
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        let caps = NegotiatedCaps {
            configuration: params
                .capabilities
                .workspace
                .as_ref()
                .and_then(|w| w.configuration)
                .unwrap_or(false),
            workspace_folders: params
                .capabilities
                .workspace
                .as_ref()
                .and_then(|w| w.workspace_folders)
                .unwrap_or(false),
            related_information: params
                .capabilities
                .text_document
                .as_ref()
                .and_then(|t| t.publish_diagnostics.as_ref())
                .and_then(|p| p.related_information)
                .unwrap_or(false),
        };
        info!(
            configuration = caps.configuration,
            workspace_folders = caps.workspace_folders,
            related_information = caps.related_information,
            "negotiated client capabilities"
        );
        *self.state.caps.write().await = caps;

        let mut roots = Vec::new();
        if caps.workspace_folders {
            if let Some(folders) = &params.workspace_folders {
                roots.extend(folders.iter().filter_map(|f| f.uri.to_file_path().ok()));
            }
        }
        #[allow(deprecated)]
        if roots.is_empty() {
            if let Some(root) = params.root_uri.as_ref().and_then(|u| u.to_file_path().ok()) {
                roots.push(root);
            }
        }
        *self.state.roots.write().await = roots;

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "perl-ide".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(true),
                    trigger_characters: Some(
                        ["$", "@", "%", ".", ":", "::"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                references_provider: Some(OneOf::Left(true)),
                document_highlight_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                rename_provider: Some(OneOf::Right(RenameOptions {
                    prepare_provider: Some(true),
                    work_done_progress_options: Default::default(),
                })),
                ..Default::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("perl language server initialized");
        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(scan_workspace(client, state));
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.text_document.text;
        self.state
            .documents
            .write()
            .await
            .insert(uri.clone(), text.clone());
        self.analyze_and_publish(uri, &text, AnalysisMode::OnFileOpen)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = {
            let mut documents = self.state.documents.write().await;
            let Some(text) = documents.get_mut(&uri) else {
                return;
            };
            for change in &params.content_changes {
                apply_content_change(text, change);
            }
            text.clone()
        };
        self.analyze_and_publish(uri, &text, AnalysisMode::OnFileOpen)
            .await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.state.documents.write().await.remove(&uri);
        self.state.index.write().await.close(uri.as_str());
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_configuration(&self, _: DidChangeConfigurationParams) {
        if self.state.caps.read().await.configuration {
            self.state.settings.write().await.clear();
        }
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for event in params.changes {
            if event.typ == FileChangeType::DELETED {
                self.state.index.write().await.close(event.uri.as_str());
                self.client
                    .publish_diagnostics(event.uri, Vec::new(), None)
                    .await;
                continue;
            }
            let Ok(path) = event.uri.to_file_path() else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    self.analyze_and_publish(event.uri, &text, AnalysisMode::OnWorkspaceOpen)
                        .await;
                }
                Err(e) => warn!(uri = %event.uri, "watched file unreadable: {e}"),
            }
        }
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> jsonrpc::Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position_params.position);
        let index = self.state.index.read().await;
        let locations: Vec<Location> =
            query::definition(&index, uri.as_str(), &tree, &text, point)
                .iter()
                .filter_map(to_location)
                .collect();
        Ok(Some(GotoDefinitionResponse::Array(locations)))
    }

    async fn references(&self, params: ReferenceParams) -> jsonrpc::Result<Option<Vec<Location>>> {
        let uri = params.text_document_position.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position.position);
        let index = self.state.index.read().await;
        let locations: Vec<Location> =
            query::references(&index, uri.as_str(), &tree, &text, point, false)
                .iter()
                .filter_map(to_location)
                .collect();
        Ok(Some(locations))
    }

    async fn document_highlight(
        &self,
        params: DocumentHighlightParams,
    ) -> jsonrpc::Result<Option<Vec<DocumentHighlight>>> {
        let uri = params.text_document_position_params.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position_params.position);
        let index = self.state.index.read().await;
        let highlights = query::references(&index, uri.as_str(), &tree, &text, point, true)
            .iter()
            .map(|loc| DocumentHighlight {
                range: to_lsp_range(loc.range),
                kind: Some(DocumentHighlightKind::READ),
            })
            .collect();
        Ok(Some(highlights))
    }

    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position_params.position);
        Ok(query::hover(&tree, &text, point).map(|markdown| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: markdown,
            }),
            range: None,
        }))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> jsonrpc::Result<Option<DocumentSymbolResponse>> {
        let uri = params.text_document.uri;
        let index = self.state.index.read().await;
        let symbols: Vec<DocumentSymbol> = index
            .declarations(uri.as_str())
            .iter()
            .map(to_document_symbol)
            .collect();
        Ok(Some(DocumentSymbolResponse::Nested(symbols)))
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> jsonrpc::Result<Option<Vec<SymbolInformation>>> {
        let index = self.state.index.read().await;
        let symbols = query::workspace_symbols(&index, &params.query)
            .iter()
            .filter_map(to_symbol_information)
            .collect();
        Ok(Some(symbols))
    }

    async fn rename(&self, params: RenameParams) -> jsonrpc::Result<Option<WorkspaceEdit>> {
        let uri = params.text_document_position.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position.position);
        let index = self.state.index.read().await;
        let edits = query::rename(&index, uri.as_str(), &tree, &text, point, &params.new_name)
            .map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))?;

        let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
        for edit in edits {
            let Ok(url) = Url::parse(&edit.uri) else {
                continue;
            };
            changes.entry(url).or_default().push(TextEdit {
                range: to_lsp_range(edit.range),
                new_text: edit.new_text,
            });
        }
        Ok(Some(WorkspaceEdit {
            changes: Some(changes),
            ..Default::default()
        }))
    }

    async fn prepare_rename(
        &self,
        params: TextDocumentPositionParams,
    ) -> jsonrpc::Result<Option<PrepareRenameResponse>> {
        let uri = params.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.position);
        Ok(query::prepare_rename(&tree, &text, point).map(|(range, placeholder)| {
            PrepareRenameResponse::RangeWithPlaceholder {
                range: to_lsp_range(range),
                placeholder,
            }
        }))
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> jsonrpc::Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let Some((tree, text)) = self.document_state(&uri).await else {
            return Ok(None);
        };
        let point = position_to_point(&text, params.text_document_position.position);
        let trigger = params
            .context
            .and_then(|c| c.trigger_character)
            .and_then(|s| s.chars().next());
        let settings = self.settings_for(&uri).await;

        let index = self.state.index.read().await;
        let items: Vec<CompletionItem> = query::completion(
            &index,
            uri.as_str(),
            &tree,
            &text,
            point,
            trigger,
            settings.function_call_style.into(),
        )
        .iter()
        .map(|candidate| completion_item(candidate, &uri))
        .collect();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn completion_resolve(&self, mut item: CompletionItem) -> jsonrpc::Result<CompletionItem> {
        let Some(data) = item
            .data
            .take()
            .and_then(|v| serde_json::from_value::<CompletionData>(v).ok())
        else {
            return Ok(item);
        };

        let Some((_, text)) = self.document_state(&data.uri).await else {
            return Ok(item);
        };
        let settings = self.settings_for(&data.uri).await;
        let edits = imports::synthesize_import(
            &text,
            &data.package_name,
            &data.function_name,
            settings.import_style.into(),
        );
        item.additional_text_edits = Some(
            edits
                .into_iter()
                .map(|e| TextEdit {
                    range: to_lsp_range(e.range),
                    new_text: e.new_text,
                })
                .collect(),
        );
        Ok(item)
    }
}

pub async fn run_server() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use perl_analyzer::{Position as APosition, Range as ARange};
    use std::path::Path;

    #[test]
    fn default_glob_matches_perl_files() {
        let matcher = globset::Glob::new(DEFAULT_GLOB).unwrap().compile_matcher();
        assert!(matcher.is_match(Path::new("lib/Foo/Bar.pm")));
        assert!(matcher.is_match(Path::new("script.pl")));
        assert!(matcher.is_match(Path::new("t/basic.t")));
        assert!(matcher.is_match(Path::new("web/page.esp")));
        assert!(!matcher.is_match(Path::new("README.md")));
        assert!(!matcher.is_match(Path::new("src/main.rs")));
    }

    #[test]
    fn diagnostics_convert_with_source_and_severity() {
        let diags = vec![perl_analyzer::Diagnostic {
            range: ARange::new(APosition::new(1, 0), APosition::new(1, 4)),
            message: "Syntax error: expected \";\"".to_string(),
        }];
        let lsp = to_lsp_diagnostics(&diags);
        assert_eq!(lsp.len(), 1);
        assert_eq!(lsp[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(lsp[0].source.as_deref(), Some("perl"));
        assert_eq!(lsp[0].range.start.line, 1);
    }

    #[test]
    fn document_symbols_use_the_name_range_twice() {
        let decl = perl_analyzer::FunctionReference {
            uri: "file:///a.pm".to_string(),
            function_name: "greet".to_string(),
            package_name: "Foo::Bar".to_string(),
            position: ARange::new(APosition::new(1, 4), APosition::new(1, 9)),
        };
        let symbol = to_document_symbol(&decl);
        assert_eq!(symbol.name, "greet");
        assert_eq!(symbol.kind, SymbolKind::FUNCTION);
        assert_eq!(symbol.range, symbol.selection_range);
        assert_eq!(symbol.detail.as_deref(), Some("Foo::Bar"));
    }

    #[test]
    fn completion_items_sort_current_file_first() {
        let uri = Url::parse("file:///a.pm").unwrap();
        let local = query::CompletionCandidate {
            label: "near".to_string(),
            insert_text: "near()".to_string(),
            kind: query::CandidateKind::Function,
            from_current_file: true,
            resolve: None,
        };
        let remote = query::CompletionCandidate {
            label: "far".to_string(),
            insert_text: "far()".to_string(),
            kind: query::CandidateKind::Function,
            from_current_file: false,
            resolve: None,
        };
        let a = completion_item(&local, &uri);
        let b = completion_item(&remote, &uri);
        assert!(a.sort_text.unwrap() < b.sort_text.unwrap());
    }

    #[test]
    fn completion_data_round_trips() {
        let data = CompletionData {
            uri: Url::parse("file:///a.pm").unwrap(),
            package_name: "Foo".to_string(),
            function_name: "helper".to_string(),
        };
        let value = serde_json::to_value(&data).unwrap();
        let back: CompletionData = serde_json::from_value(value).unwrap();
        assert_eq!(back.package_name, "Foo");
        assert_eq!(back.function_name, "helper");
    }
}
