//! Error Handling Module
//!
//! Defines the error taxonomy for the few-shot training engine.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for few-shot training operations
#[derive(Error, Debug)]
pub enum FewShotError {
    /// Invalid or unsupported backbone/training configuration.
    ///
    /// Raised at construction time, before any training starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An episode's realized tensor shapes disagree with its declared
    /// metadata, or classifier inputs violate the episodic label contract.
    ///
    /// Fatal: indicates a dataset/configuration mismatch, not a transient
    /// condition.
    #[error("Episode shape error: {0}")]
    EpisodeShape(String),

    /// Failure while persisting or restoring checkpoint state
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience Result type for few-shot training operations
pub type Result<T> = std::result::Result<T, FewShotError>;

impl From<serde_json::Error> for FewShotError {
    fn from(err: serde_json::Error) -> Self {
        FewShotError::Serialization(err.to_string())
    }
}
