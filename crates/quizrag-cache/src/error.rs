//! Cache-related error types
//!
//! None of these reach gateway callers; they travel between the stores and
//! the gateway, which turns them into misses, `false` and counter bumps.

use thiserror::Error;

/// Cache operation errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store rejected the call or could not be reached
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// The last health probe failed; calls short-circuit until the next probe
    #[error("Cache backend is unhealthy")]
    Unhealthy,

    /// No backing store was configured for this gateway
    #[error("Cache is disabled")]
    Disabled,

    #[error("Cache operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Stored bytes exist but cannot be decoded into the requested payload
    #[error("Malformed cache entry {key}: {message}")]
    Malformed { key: String, message: String },

    /// Expiry would fall outside what the store can represent
    #[error("TTL of {seconds}s is out of range")]
    TtlOutOfRange { seconds: u64 },

    #[error("Invalid key pattern: {pattern}")]
    InvalidPattern { pattern: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Whether this failure says something about store connectivity.
    ///
    /// Decode problems are local to one entry and must not flip the gateway
    /// into the disconnected state.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            CacheError::Backend { .. }
                | CacheError::Unhealthy
                | CacheError::Timeout { .. }
                | CacheError::Io(_)
        )
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;
