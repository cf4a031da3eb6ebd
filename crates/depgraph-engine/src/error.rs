//! Engine error type

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("project root not found: {}", .0.display())]
    RootNotFound(PathBuf),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),
    #[error("invalid skip pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
