use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while extracting formulas.
///
/// Only `CatalogNotFound` and `Io` abort a run. The per-entry variants are
/// collected as warnings by the resolution engine.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("benchmark catalog not found: {}", path.display())]
    CatalogNotFound { path: PathBuf },

    #[error("line {line}: benchmark '{identifier}' does not start with '{owner}.'")]
    MalformedIdentifier {
        line: usize,
        owner: String,
        identifier: String,
    },

    #[error("line {line}: unreadable catalog record: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("cannot load class {class}: {reason}")]
    ClassLoad { class: String, reason: String },

    #[error("benchmark method {method} not found in {class}")]
    MethodNotFound { class: String, method: String },

    #[error("cannot read archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid class file: {0}")]
    ClassFormat(String),

    #[error("cannot serialize mapping record '{key}': {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExtractError {
    /// Whether this error aborts the whole run rather than a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractError::CatalogNotFound { .. }
                | ExtractError::InvalidRecord { .. }
                | ExtractError::Io(_)
        )
    }
}
