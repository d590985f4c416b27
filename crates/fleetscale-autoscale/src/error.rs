use thiserror::Error;

use fleetscale_actuator::ActuatorError;
use fleetscale_core::ConfigError;
use fleetscale_ledger::LedgerError;
use fleetscale_samples::SampleError;

/// Failures that end a check.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("sample store error: {0}")]
    Samples(#[from] SampleError),

    #[error("failed to query fleet instances: {0}")]
    Query(#[source] ActuatorError),

    /// The check was still archived and recorded as `check`.
    #[error("check {check}: failed to apply instance count {target}: {source}")]
    Apply {
        check: u64,
        target: u32,
        #[source]
        source: ActuatorError,
    },

    #[error("history error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type ControlResult<T> = Result<T, ControlError>;
