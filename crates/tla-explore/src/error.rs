//! Error types for state-space exploration

use crate::config::ConfigError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for exploration operations
pub type ExploreResult<T> = Result<T, ExploreError>;

/// Errors that end an exploration run.
///
/// None of these are retried: a page that cannot be read means the frontier
/// is corrupted, and a trace record that cannot be written means the
/// counterexample could no longer be reconstructed.
#[derive(Debug, Error)]
pub enum ExploreError {
    /// A page file could not be decoded
    #[error("error reading states from {}: {message}", path.display())]
    PageRead { path: PathBuf, message: String },

    /// A page file could not be written or made visible
    #[error("error writing states to {}: {message}", path.display())]
    PageWrite { path: PathBuf, message: String },

    /// A worker's trace log could not be appended to or read
    #[error("trace log of worker {worker}: {message}")]
    TraceIo { worker: u16, message: String },

    /// Operation reserved for later use
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// The successor generator failed on a state
    #[error("error computing successors: {message}")]
    Expansion { message: String },

    /// The successor generator found a property violation
    #[error("property violated: {message}")]
    Violation { message: String },

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Other I/O failure (creating the disk directory, spawning threads)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExploreError {
    pub fn page_read(path: &Path, message: impl ToString) -> Self {
        ExploreError::PageRead {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn page_write(path: &Path, message: impl ToString) -> Self {
        ExploreError::PageWrite {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn trace(worker: u16, message: impl ToString) -> Self {
        ExploreError::TraceIo {
            worker,
            message: message.to_string(),
        }
    }

    pub fn expansion(message: impl Into<String>) -> Self {
        ExploreError::Expansion {
            message: message.into(),
        }
    }

    pub fn violation(message: impl Into<String>) -> Self {
        ExploreError::Violation {
            message: message.into(),
        }
    }

    /// Whether this error reports a property violation found by the model
    /// rather than a failure of the engine itself.
    pub fn is_violation(&self) -> bool {
        matches!(self, ExploreError::Violation { .. })
    }
}
