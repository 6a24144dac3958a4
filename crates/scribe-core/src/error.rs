//! Error types for the scribe retrieval system.

use thiserror::Error;

/// Result type alias using ScribeError.
pub type Result<T> = std::result::Result<T, ScribeError>;

/// Errors that can occur across the indexing and query components.
#[derive(Error, Debug)]
pub enum ScribeError {
    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Index store error (SQLite, FTS, ledger).
    #[error("Index error: {message}")]
    Index { message: String },

    /// Embedding provider error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// The vector collection was created with a different dimension than
    /// the embedder now produces. Continuing would corrupt the collection,
    /// so indexing must abort.
    #[error("Embedding dimension mismatch: collection has {existing}, embedder produced {actual}")]
    DimensionMismatch { existing: usize, actual: usize },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ScribeError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an index store error.
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the failed call as-is.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Index { .. } | Self::Embedding { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScribeError::DimensionMismatch {
            existing: 1024,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("1024"));
        assert!(msg.contains("768"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ScribeError::index("store down").is_transient());
        assert!(!ScribeError::config("missing path").is_transient());
        assert!(!ScribeError::DimensionMismatch { existing: 4, actual: 8 }.is_transient());
    }
}
