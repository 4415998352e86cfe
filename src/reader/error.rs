//! Reader error types.

use std::path::PathBuf;

/// Errors raised by the checkpoint store.
#[derive(thiserror::Error, Debug)]
pub enum CheckpointError {
    /// I/O error while reading or writing checkpoint files.
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint content could not be (de)serialized.
    #[error("Checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors that can occur while tailing a directory.
#[derive(thiserror::Error, Debug)]
pub enum ReaderError {
    /// The watched path cannot be resolved.
    #[error("Cannot resolve directory {path}: {source}")]
    InvalidDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The watched path exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The valid-file glob pattern does not compile.
    #[error("Invalid file pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Unknown `whence` value.
    #[error("Unsupported whence value: {0} (expected \"oldest\" or \"newest\")")]
    UnsupportedWhence(String),

    /// The tailer was closed.
    #[error("Reader {0} has been closed")]
    Closed(PathBuf),

    /// Checkpoint collaborator failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Returns true for errors that fail construction and must not be retried.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidDirectory { .. }
                | Self::NotADirectory(_)
                | Self::InvalidPattern { .. }
                | Self::UnsupportedWhence(_)
        )
    }
}

impl From<ReaderError> for std::io::Error {
    fn from(err: ReaderError) -> Self {
        match err {
            ReaderError::Io(e) => e,
            ReaderError::Closed(_) => std::io::Error::new(std::io::ErrorKind::BrokenPipe, err),
            other => std::io::Error::other(other),
        }
    }
}
