//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid digest '{0}': expected 32 hexadecimal characters")]
    InvalidDigest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
