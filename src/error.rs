use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed field definition or a definition that conflicts with the
    /// source it would be merged into.
    #[error("invalid field definition: {0}")]
    Config(String),

    #[error("source {} unavailable: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("allocation failed: {0}")]
    Alloc(&'static str),

    #[error("activation failed: {0}")]
    Activation(String),

    #[error("worker error: {0}")]
    Worker(&'static str),
}

impl Error {
    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
