use thiserror::Error;

pub type RetrievalResult<T> = Result<T, RetrievalError>;
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors surfaced to `search` callers.
///
/// Backend trouble never shows up here; only requests the caller should not
/// have made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure of a single adapter call, absorbed by the orchestrator
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Transient: connection refused, backend down, index not built yet
    #[error("{adapter} unavailable: {reason}")]
    Unavailable { adapter: String, reason: String },

    /// Missing configuration; the adapter stays unavailable for good
    #[error("{adapter} misconfigured: {reason}")]
    Misconfigured { adapter: String, reason: String },

    #[error("{adapter} timed out after {millis}ms")]
    Timeout { adapter: String, millis: u64 },

    #[error("{adapter} returned a malformed response: {reason}")]
    Malformed { adapter: String, reason: String },
}

impl AdapterError {
    pub fn unavailable(adapter: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            adapter: adapter.into(),
            reason: reason.to_string(),
        }
    }

    pub fn misconfigured(adapter: impl Into<String>, reason: impl ToString) -> Self {
        Self::Misconfigured {
            adapter: adapter.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(adapter: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            adapter: adapter.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether retrying on a later request can help
    pub fn is_transient(&self) -> bool {
        !matches!(self, AdapterError::Misconfigured { .. })
    }
}

/// Errors raised while building or querying the BM25 index
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised while persisting or loading a corpus snapshot
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
