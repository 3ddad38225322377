//! Error types for Reel

use std::io;
use thiserror::Error;

/// Result type for Reel operations
pub type Result<T> = std::result::Result<T, ReelError>;

/// Errors that can occur in Reel
#[derive(Debug, Error)]
pub enum ReelError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid cassette file format
    #[error("Invalid cassette format: {0}")]
    InvalidFormat(String),

    /// Cassette file corrupted (CRC mismatch)
    #[error("Cassette corrupted at offset {offset}: expected CRC {expected:#x}, got {actual:#x}")]
    CorruptedData {
        /// Offset where corruption was detected
        offset: u64,
        /// Expected CRC32 value
        expected: u32,
        /// Actual CRC32 value
        actual: u32,
    },

    /// No recorded interaction matches the request
    #[error("No recorded interaction for {method} {url}")]
    InteractionNotFound {
        /// Request method
        method: String,
        /// Request URL
        url: String,
    },

    /// The real upstream call failed
    #[error("Upstream request failed: {0}")]
    Network(String),

    /// Request duplication or body buffering failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Request carries more headers than allowed
    #[error("Too many headers: {count} exceeds limit of {limit}")]
    TooManyHeaders {
        /// Header count
        count: usize,
        /// Header limit
        limit: usize,
    },

    /// Invalid cassette name
    #[error("Invalid cassette name: {0}")]
    InvalidCassetteName(String),

    /// A round trip through the transport failed
    #[error("Failed to process request for URL {url}: {source}")]
    RoundTrip {
        /// URL of the failed request
        url: String,
        /// Underlying failure
        #[source]
        source: Box<ReelError>,
    },
}
