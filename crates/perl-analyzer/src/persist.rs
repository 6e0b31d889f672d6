//! Index persistence: Brotli-compressed JSON under `.vscode/`.
//!
//! Only the cold cache (declarations + references) is persisted; trees are
//! reparsed on demand. The sidecar keeps its historical `function_map.zip`
//! name even though the payload is Brotli, for compatibility with indexes
//! written by earlier releases.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;
use crate::types::FunctionReference;

const SIDECAR_DIR: &str = ".vscode";
const SIDECAR_FILE: &str = "function_map.zip";

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 11;
const BROTLI_WINDOW: u32 = 22;

pub type DeclMap = HashMap<String, Vec<FunctionReference>>;
pub type RefMap = HashMap<String, HashMap<String, Vec<FunctionReference>>>;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    #[serde(rename = "uriToFunctionDeclarations")]
    declarations: DeclMap,
    #[serde(rename = "functionReference")]
    references: RefMap,
}

fn sidecar_path(workspace_root: &Path) -> std::path::PathBuf {
    workspace_root.join(SIDECAR_DIR).join(SIDECAR_FILE)
}

/// Serialize and compress the persisted subset.
pub fn save(workspace_root: &Path, decls: &DeclMap, refs: &RefMap) -> Result<(), AnalyzerError> {
    let payload = PersistedIndex {
        declarations: decls.clone(),
        references: refs.clone(),
    };
    let json = serde_json::to_vec(&payload)?;

    let dir = workspace_root.join(SIDECAR_DIR);
    std::fs::create_dir_all(&dir).map_err(|source| AnalyzerError::Unreadable {
        path: dir.clone(),
        source,
    })?;

    let path = sidecar_path(workspace_root);
    let file = std::fs::File::create(&path).map_err(|source| AnalyzerError::Unreadable {
        path: path.clone(),
        source,
    })?;
    let mut writer = brotli::CompressorWriter::new(file, BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
    writer
        .write_all(&json)
        .and_then(|_| writer.flush())
        .map_err(|source| AnalyzerError::Unreadable { path, source })?;
    Ok(())
}

/// Decompress and deserialize a previously saved index. `Ok(None)` when no
/// sidecar exists; decode failures are errors so the caller can log and
/// start empty.
pub fn load(workspace_root: &Path) -> Result<Option<(DeclMap, RefMap)>, AnalyzerError> {
    let path = sidecar_path(workspace_root);
    let file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(AnalyzerError::Unreadable { path, source }),
    };

    let mut json = Vec::new();
    brotli::Decompressor::new(file, BROTLI_BUFFER)
        .read_to_end(&mut json)
        .map_err(|e| AnalyzerError::Persistence(e.to_string()))?;
    let payload: PersistedIndex = serde_json::from_slice(&json)?;
    Ok(Some((payload.declarations, payload.references)))
}
