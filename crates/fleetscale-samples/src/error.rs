//! Error types for the sample store.

use std::path::PathBuf;

use thiserror::Error;

pub type SampleResult<T> = Result<T, SampleError>;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("failed to scan {path}: {reason}")]
    Scan { path: PathBuf, reason: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed sample {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid sample {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("no instance id in file name {0:?}")]
    MissingInstanceId(String),

    #[error("failed to archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },
}
