//! Index orchestration and freshness policy.
//!
//! The [`Indexer`] runs load → chunk → embed → persist for one persistence
//! directory and decides whether an existing collection can be reused.
//!
//! # Example
//!
//! ```rust,ignore
//! use personal_rag::{Indexer, RagConfig};
//!
//! let indexer = Indexer::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .build()?;
//!
//! let handle = indexer.get_or_build().await?;
//! println!("{} chunks", handle.index.len());
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::document::Chunk;
use crate::embedding::{EmbedOptions, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index::PersistentIndex;
use crate::loader::{DocumentLoader, Loader, UrlOutcome};
use crate::vectorstore::VectorStore;

/// Lifecycle of the indexer's collection within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// No index has been loaded or built, or the last build failed.
    Absent,
    /// A build is running.
    Building,
    /// An index was loaded or built successfully.
    Ready,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Building => "building",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// A document the chunker rejected during a build.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedDocument {
    /// The document's path or URL.
    pub source: String,
    /// Why it was skipped.
    pub reason: String,
}

/// What a build consumed and produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Documents successfully loaded.
    pub document_count: usize,
    /// Chunks embedded and stored.
    pub chunk_count: usize,
    /// One entry per configured URL.
    pub url_outcomes: Vec<UrlOutcome>,
    /// Documents dropped by the chunker.
    pub skipped_documents: Vec<SkippedDocument>,
}

/// A ready index plus, when it was freshly built, the build report.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    /// The loaded or built collection.
    pub index: Arc<PersistentIndex>,
    /// `None` when an existing collection was loaded.
    pub report: Option<BuildReport>,
}

/// Builds, loads, and rebuilds the collection under one persistence directory.
///
/// The indexer is the only writer of its directory. Builds are serialized;
/// the indexer does not cache the returned index, so callers that need one
/// instance across calls must hold on to it.
pub struct Indexer {
    config: RagConfig,
    loader: Arc<dyn Loader>,
    chunker: Arc<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    state: Mutex<IndexState>,
    build_lock: Mutex<()>,
}

impl Indexer {
    /// Create a new [`IndexerBuilder`].
    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Whether a persisted collection is present. No side effects.
    pub fn is_indexed(&self) -> bool {
        PersistentIndex::exists(&self.config.persist_dir)
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> IndexState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: IndexState) {
        *self.state.lock().await = state;
    }

    /// Load the persisted collection if one is present, otherwise build it.
    ///
    /// # Errors
    ///
    /// Propagates load, embedding, and persistence errors. On failure the
    /// state returns to [`IndexState::Absent`].
    pub async fn get_or_build(&self) -> Result<IndexHandle> {
        let _build = self.build_lock.lock().await;
        if self.is_indexed() {
            info!(persist_dir = %self.config.persist_dir.display(), "loading existing index");
            match self.load().await {
                Ok(index) => {
                    self.set_state(IndexState::Ready).await;
                    return Ok(IndexHandle { index: Arc::new(index), report: None });
                }
                Err(RagError::IndexNotFound { .. }) => {
                    warn!(
                        persist_dir = %self.config.persist_dir.display(),
                        collection = %self.config.collection_name,
                        "persist directory holds no collection; building"
                    );
                }
                Err(e) => {
                    self.set_state(IndexState::Absent).await;
                    return Err(e);
                }
            }
        }
        info!(persist_dir = %self.config.persist_dir.display(), "building new index");
        self.build_locked().await
    }

    /// Open the persisted collection without rebuilding.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexNotFound`] when nothing is persisted.
    pub async fn load(&self) -> Result<PersistentIndex> {
        PersistentIndex::load(
            &self.config.collection_name,
            &self.config.persist_dir,
            self.embedding_provider.as_ref(),
        )
        .await
    }

    /// Rebuild from the sources, replacing any persisted collection.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_build`](Self::get_or_build). A failed rebuild leaves
    /// the previously persisted collection in place.
    pub async fn force_reindex(&self) -> Result<IndexHandle> {
        let _build = self.build_lock.lock().await;
        info!(persist_dir = %self.config.persist_dir.display(), "reindexing");
        self.build_locked().await
    }

    async fn build_locked(&self) -> Result<IndexHandle> {
        self.set_state(IndexState::Building).await;
        match self.run_build().await {
            Ok(handle) => {
                self.set_state(IndexState::Ready).await;
                Ok(handle)
            }
            Err(e) => {
                error!(error = %e, "index build failed");
                self.set_state(IndexState::Absent).await;
                Err(e)
            }
        }
    }

    async fn run_build(&self) -> Result<IndexHandle> {
        // 1. Load sources
        let loaded = self.loader.load().await?;

        // 2. Chunk, skipping documents the chunker rejects
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut skipped_documents = Vec::new();
        for document in &loaded.documents {
            match self.chunker.chunk(document) {
                Ok(doc_chunks) => chunks.extend(doc_chunks),
                Err(e) => {
                    warn!(source = document.id(), error = %e, "skipping document");
                    skipped_documents.push(SkippedDocument {
                        source: document.id().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        // 3. Embed and persist
        let options = EmbedOptions {
            batch_size: self.config.embed_batch_size,
            timeout: self.config.request_timeout(),
        };
        let index = PersistentIndex::build(
            chunks,
            self.embedding_provider.as_ref(),
            &self.config.collection_name,
            &self.config.persist_dir,
            options,
        )
        .await?;

        let report = BuildReport {
            document_count: loaded.documents.len(),
            chunk_count: index.len(),
            url_outcomes: loaded.url_outcomes,
            skipped_documents,
        };
        info!(
            document_count = report.document_count,
            chunk_count = report.chunk_count,
            skipped = report.skipped_documents.len(),
            "indexing completed and persisted"
        );
        Ok(IndexHandle { index: Arc::new(index), report: Some(report) })
    }
}

/// Builder for constructing an [`Indexer`].
///
/// Only the embedding provider is required. The loader and chunker default
/// to [`DocumentLoader`] and [`RecursiveChunker`] built from the config.
///
/// # Example
///
/// ```rust,ignore
/// let indexer = Indexer::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .chunker(Arc::new(chunker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct IndexerBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn Loader>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl IndexerBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the document loader.
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Build the [`Indexer`]. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<Indexer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let loader: Arc<dyn Loader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(DocumentLoader::from_config(&config)?),
        };
        let chunker: Arc<dyn Chunker> = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };

        Ok(Indexer {
            config,
            loader,
            chunker,
            embedding_provider,
            state: Mutex::new(IndexState::Absent),
            build_lock: Mutex::new(()),
        })
    }
}
