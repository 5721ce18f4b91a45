//! Error types for the AlgoLab engines.
//!
//! The engines themselves have no fatal states. Errors only arise at the
//! edges: rejected configuration, malformed props, and asking an unstable
//! system to be committed.

use thiserror::Error;

/// Top-level error for the engine crate.
#[derive(Debug, Error)]
pub enum LabError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Capacity simulator refused an operation
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// Props JSON could not be parsed
    #[error("Malformed props: {0}")]
    Props(#[from] serde_json::Error),
}

/// Rejected race configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("dataSize must be at least 1")]
    ZeroDataSize,

    #[error("dataSize {size} exceeds the maximum of {max}")]
    DataSizeTooLarge { size: usize, max: usize },

    #[error("speedDivisor must be at least 1")]
    ZeroSpeedDivisor,
}

/// Errors from the capacity simulator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapacityError {
    /// The last tick was not stable, so there is nothing to commit
    #[error("System unstable: latency {latency:.0}ms, error rate {error_rate:.1}%")]
    Unstable { latency: f64, error_rate: f64 },
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, LabError>;
