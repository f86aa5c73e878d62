//! Question-to-chunks retrieval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::document::SearchResult;
use crate::embedding::{EmbeddingProvider, with_provider_budget};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Embeds a question and returns the `top_k` most similar chunks.
///
/// The retriever never mutates the store. The most recent result set is kept
/// for callers that want to show which sources were used; it is written after
/// each successful retrieval and never read back by [`retrieve`](Self::retrieve).
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    timeout: Option<Duration>,
    last: Mutex<Vec<SearchResult>>,
}

impl Retriever {
    /// Create a retriever over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if `embedder` does not produce
    /// vectors of the store's dimension, and [`RagError::Config`] if
    /// `top_k == 0`.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if store.dimensions() != embedder.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        Ok(Self { store, embedder, top_k, timeout: None, last: Mutex::new(Vec::new()) })
    }

    /// Apply a budget to the question embedding call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of chunks returned per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the chunks most similar to `question`, best first.
    ///
    /// An empty result is a valid outcome (for example an empty index).
    ///
    /// # Errors
    ///
    /// Propagates embedding failures and timeouts, and search errors.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SearchResult>> {
        let embedding =
            with_provider_budget(self.embedder.name(), self.timeout, self.embedder.embed(question))
                .await
                .inspect_err(|e| error!(error = %e, "question embedding failed"))?;

        let results = self.store.search(&embedding, self.top_k).await.inspect_err(|e| {
            error!(error = %e, "vector search failed");
        })?;
        debug!(result_count = results.len(), top_k = self.top_k, "retrieved chunks");

        *self.last.lock().await = results.clone();
        Ok(results)
    }

    /// The result set of the most recent successful retrieval.
    pub async fn last_retrieved(&self) -> Vec<SearchResult> {
        self.last.lock().await.clone()
    }
}
