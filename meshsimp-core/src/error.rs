//! Error types for meshsimp

use thiserror::Error;

/// Main error type for meshsimp operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

/// Result type alias for meshsimp operations
pub type Result<T> = std::result::Result<T, Error>;
