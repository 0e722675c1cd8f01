//! Error types for valuestore
//!
//! Provides a unified error type for all operations. Lookups that simply
//! find nothing are not errors; they return `None`.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for valuestore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Offset {offset} is outside the data file (size {file_size})")]
    OffsetOutOfRange { offset: u64, file_size: u64 },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt store file: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Argument Errors
    // -------------------------------------------------------------------------
    #[error("Payload of {0} bytes exceeds the 4 GiB record limit")]
    PayloadTooLarge(usize),

    #[error("Identifier space exhausted")]
    IdSpaceExhausted,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
