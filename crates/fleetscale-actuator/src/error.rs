//! Actuator error types.

use std::path::PathBuf;

use thiserror::Error;

use fleetscale_core::ConfigError;
use fleetscale_core::http::HttpError;

/// Errors that can occur while querying or scaling the fleet.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("orchestrator unreachable: {0}")]
    Http(#[from] HttpError),

    #[error("orchestrator returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected orchestrator response: {0}")]
    Decode(String),

    #[error("failed to read token {path}: {source}")]
    Token {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("instance count must be positive, got {0}")]
    InvalidCount(u32),

    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),
}

pub type ActuatorResult<T> = Result<T, ActuatorError>;
