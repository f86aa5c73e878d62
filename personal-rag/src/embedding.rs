//! Embedding provider trait for generating vector embeddings from text.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// A provider that generates vector embeddings from text input.
///
/// The same provider must be used to build an index and to embed questions
/// against it, otherwise the vector spaces will not match. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Returns one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}

/// Run an embedding call under an optional budget, mapping an elapsed budget
/// to [`RagError::ProviderTimeout`].
pub(crate) async fn with_provider_budget<T, F>(
    provider: &str,
    budget: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match budget {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| RagError::ProviderTimeout { provider: provider.to_string(), timeout })?,
        None => call.await,
    }
}

/// Batching and time budget for embedding calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedOptions {
    /// Texts sent per provider request.
    pub batch_size: usize,
    /// Budget applied to each provider request.
    pub timeout: Option<Duration>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self { batch_size: 8, timeout: None }
    }
}

/// Embed `texts` in batches, checking that every vector has the provider's
/// declared dimension.
pub(crate) async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    options: EmbedOptions,
) -> Result<Vec<Vec<f32>>> {
    let expected = provider.dimensions();
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(options.batch_size.max(1)) {
        let embedded =
            with_provider_budget(provider.name(), options.timeout, provider.embed_batch(batch))
                .await?;
        if embedded.len() != batch.len() {
            return Err(RagError::Provider {
                provider: provider.name().to_string(),
                message: format!("expected {} embeddings, got {}", batch.len(), embedded.len()),
            });
        }
        for vector in embedded {
            if vector.len() != expected {
                return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
            }
            vectors.push(vector);
        }
    }
    Ok(vectors)
}
