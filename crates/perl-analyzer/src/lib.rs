//! Workspace analyzer for Perl: tree-sitter parsing, symbol extraction,
//! an incrementally updated index with a persisted cold cache, and the
//! query engine the language server answers from.

pub mod error;
pub mod extract;
pub mod imports;
pub mod index;
pub mod kinds;
pub mod parser;
pub mod persist;
pub mod query;
pub mod scope;
pub mod types;

pub use error::AnalyzerError;
pub use imports::{ImportEdit, ImportStyle};
pub use index::{AnalysisMode, CachingStrategy, WorkspaceIndex};
pub use query::{
    CandidateKind, CompletionCandidate, FunctionCallStyle, QueryError, RenameEdit, ResolveData,
};
pub use types::{Diagnostic, FunctionReference, Location, PerFileIndex, Position, Range};
