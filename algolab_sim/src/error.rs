//! Error types for the simulation harness.

use crate::driver::DriveOutcome;
use algolab_core::LabError;
use thiserror::Error;

/// Why a scenario run failed.
#[derive(Debug, Error)]
pub enum SimError {
    /// A scenario check did not hold
    #[error("{0}")]
    Assertion(String),

    /// The driver stopped before the scenario was done
    #[error("Driver stopped early: {0:?}")]
    Stopped(DriveOutcome),

    /// Engine configuration or props were rejected
    #[error(transparent)]
    Lab(#[from] LabError),

    /// Reading props or writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export serialization failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DriveOutcome> for SimError {
    fn from(outcome: DriveOutcome) -> Self {
        SimError::Stopped(outcome)
    }
}

/// Fails with `message` unless `condition` holds.
pub fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), SimError> {
    if condition {
        Ok(())
    } else {
        Err(SimError::Assertion(message()))
    }
}
