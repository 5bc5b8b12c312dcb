//! Error types for strata-git

use std::path::PathBuf;

/// Result type for strata-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strata-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Filesystem error: {0}")]
    Fs(#[from] strata_fs::Error),

    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Revision '{revision}' not found")]
    RevisionNotFound { revision: String },
}
