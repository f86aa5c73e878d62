//! Error types for the `personal-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing, retrieving, or answering.
#[derive(Debug, Error)]
pub enum RagError {
    /// A local source could not be read.
    #[error("Load error ({source_id}): {message}")]
    Load {
        /// The file path or URL that failed.
        source_id: String,
        /// A description of the failure.
        message: String,
    },

    /// A document could not be split into chunks.
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// The embedding backend failed.
    #[error("Embedding provider error ({provider}): {message}")]
    Provider {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The embedding backend did not answer within the caller's budget.
    #[error("Embedding provider ({provider}) timed out after {timeout:?}")]
    ProviderTimeout {
        /// The embedding provider that timed out.
        provider: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// The generation backend failed.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The generation backend did not answer within the caller's budget.
    #[error("Generation provider ({provider}) timed out after {timeout:?}")]
    GenerationTimeout {
        /// The generation provider that timed out.
        provider: String,
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// `load` was attempted where no persisted collection exists.
    #[error("No index '{collection}' found under {}", persist_dir.display())]
    IndexNotFound {
        /// The requested collection name.
        collection: String,
        /// The persistence directory that was searched.
        persist_dir: PathBuf,
    },

    /// A question was asked before any index was built or loaded.
    #[error("Index not found. Please run /reindex first.")]
    NotReady,

    /// A vector's dimension does not match the index it is used with.
    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded by the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// Persisted index data is unreadable or could not be written.
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error outside of source loading.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Returns `true` when the error means "no index yet", so callers can
    /// prompt for indexing instead of reporting a failure.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady | Self::IndexNotFound { .. })
    }

    /// Returns `true` for either provider timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ProviderTimeout { .. } | Self::GenerationTimeout { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
