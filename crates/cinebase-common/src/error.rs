//! Error types shared across Cinebase crates

use thiserror::Error;

/// Result type alias for Cinebase operations
pub type Result<T> = std::result::Result<T, CinebaseError>;

/// Main error type for shared utilities
#[derive(Error, Debug)]
pub enum CinebaseError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
