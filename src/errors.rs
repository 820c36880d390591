use std::path::PathBuf;

use thiserror::Error;

/// Error type covering journal admission, checking, and loading failures.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("unknown {kind} '{name}'")]
    PolicyViolation { kind: &'static str, name: String },
    #[error("metadata assertion failed for ({key}: {value}): {predicate}")]
    MetadataAssertionFailed {
        key: String,
        value: String,
        predicate: String,
    },
    #[error("cannot read journal source {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("no evaluation scope in which to read journal source '{0}'")]
    NoDefaultScope(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
