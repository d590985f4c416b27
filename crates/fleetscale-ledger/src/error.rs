//! Error types for the history ledger.

use std::path::PathBuf;

use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("history document is not a JSON object")]
    NotAnObject,

    #[error("check_{0} already recorded")]
    Duplicate(u64),
}
