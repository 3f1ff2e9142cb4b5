//! Crate error type
//!
//! Case-level failures (missing inputs, empty document sets) are reported and
//! skipped by the batch driver; document-level failures are isolated per PDF.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocsiftError>;

#[derive(Debug, Error)]
pub enum DocsiftError {
    /// Persona/job definition or documents folder absent for a case
    #[error("case '{case}' is missing {what}")]
    MissingInput { case: String, what: String },

    #[error("case '{case}' has no PDF files in {}", dir.display())]
    EmptyDocumentSet { case: String, dir: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single document could not be opened or read
    #[error("layout extraction failed for '{document}': {message}")]
    Layout { document: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("similarity index error: {0}")]
    Index(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DocsiftError {
    /// True for errors that skip a whole case rather than a single document
    pub fn is_case_skip(&self) -> bool {
        matches!(
            self,
            DocsiftError::MissingInput { .. } | DocsiftError::EmptyDocumentSet { .. }
        )
    }
}
