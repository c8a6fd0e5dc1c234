//! Error types for the analysis and planning layers
//!
//! Only input problems surface as errors. Apply, verify and rollback encode
//! their failures inside the returned reports instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised at the library boundary
#[derive(Error, Debug)]
pub enum ArchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid self-map: {0}")]
    SelfMap(String),

    #[error("Invalid patch plan: {0}")]
    Plan(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse Python source: {0}")]
    Parse(String),

    #[error("Verification setup failed: {0}")]
    Verify(String),
}

impl ArchError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type ArchResult<T> = Result<T, ArchError>;
