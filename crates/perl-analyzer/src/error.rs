use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("failed to parse document")]
    Parse,

    #[error("invalid file URI: {0}")]
    InvalidUri(String),

    #[error("unreadable file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index persistence failed: {0}")]
    Persistence(String),
}

impl From<serde_json::Error> for AnalyzerError {
    fn from(e: serde_json::Error) -> Self {
        AnalyzerError::Persistence(e.to_string())
    }
}
