//! Error types for the memory crate.

use thiserror::Error;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Referenced entity or relationship does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Relationship kind outside the configured vocabulary.
    #[error("Invalid relationship kind: {0}")]
    InvalidKind(String),

    /// A traversal was aborted by its caller or ran past its deadline.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// An internal invariant was violated. Always repaired where it is detected.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    /// Invalid data or parameters.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Snapshot database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Front-matter could not be read or written.
    #[error("Front-matter error: {0}")]
    FrontMatter(#[from] serde_yaml::Error),

    /// Configuration could not be turned into a policy.
    #[error("Config error: {0}")]
    Config(#[from] cairn_config::ConfigError),
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
