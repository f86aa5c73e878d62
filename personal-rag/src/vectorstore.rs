//! Vector store trait for nearest-neighbor search over chunk embeddings.

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A read-only similarity search backend over one collection of chunks.
///
/// The retriever only ever reads through this trait; building and replacing
/// the data behind it is the indexer's job.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::{PersistentIndex, VectorStore};
///
/// let index = PersistentIndex::load("my_text_docs", "./chroma_db", &embedder).await?;
/// let results = index.search(&query_embedding, 6).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Search for the `top_k` most similar chunks to the given embedding.
    ///
    /// Returns at most `top_k` results ordered by descending similarity.
    /// Equal scores keep insertion order.
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    /// Dimension every stored and queried vector must have.
    fn dimensions(&self) -> usize;

    /// Number of stored chunks.
    fn len(&self) -> usize;

    /// Returns `true` if the store holds no chunks.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
