//! Error types for the AlgoLab environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No audio backend exists in this process (headless, not installed)
    #[error("Audio output unavailable")]
    AudioUnavailable,

    /// The backend exists but is not currently producing sound
    #[error("Audio output suspended")]
    AudioSuspended,

    /// The backend rejected a cue
    #[error("Audio backend error: {0}")]
    AudioBackend(String),
}

impl EnvError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::AudioBackend(msg.into())
    }
}
