//! The assembled question-answering system.
//!
//! [`PersonalizedRag`] wires an [`Indexer`], a [`Retriever`] over the current
//! index, and an [`AnsweringEngine`] sharing one [`ConversationMemory`].
//! Construction performs no I/O; [`initialize`](PersonalizedRag::initialize)
//! picks up a persisted index, and [`ask`](PersonalizedRag::ask) answers once
//! one is available.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::chunking::Chunker;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::engine::AnsweringEngine;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::index::PersistentIndex;
use crate::indexer::{IndexHandle, IndexState, Indexer};
use crate::loader::Loader;
use crate::memory::{ConversationMemory, Turn};
use crate::retriever::Retriever;
use crate::vectorstore::VectorStore;

/// The answer to one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// Generated text.
    pub answer: String,
    /// Text of the chunks used as context, best match first.
    pub documents: Vec<String>,
    /// The user id the exchange was recorded under.
    pub user_id: String,
}

/// Whether an index is persisted and whether one is loaded for queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    /// A collection exists under the persistence directory.
    pub indexed: bool,
    /// An index is loaded and questions can be answered.
    pub ready: bool,
}

/// Personalized retrieval-augmented question answering.
///
/// Questions run against whichever index was current when retrieval began.
/// A rebuild swaps the new index in only after it is fully persisted, so
/// concurrent questions see either the old or the new index, never a mix.
pub struct PersonalizedRag {
    indexer: Indexer,
    engine: AnsweringEngine,
    retriever: RwLock<Option<Arc<Retriever>>>,
}

impl PersonalizedRag {
    /// Create a new [`PersonalizedRagBuilder`].
    pub fn builder() -> PersonalizedRagBuilder {
        PersonalizedRagBuilder::default()
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &RagConfig {
        self.indexer.config()
    }

    /// The indexer owning the persistence directory.
    pub fn indexer(&self) -> &Indexer {
        &self.indexer
    }

    /// The shared conversation memory.
    pub fn memory(&self) -> &Arc<ConversationMemory> {
        self.engine.memory()
    }

    /// Load the persisted index if one exists.
    ///
    /// Returns `true` when an index was loaded, `false` when nothing is
    /// persisted yet. Never builds.
    pub async fn initialize(&self) -> Result<bool> {
        if !self.indexer.is_indexed() {
            info!("no persisted index; call index() or force_reindex() to build one");
            return Ok(false);
        }
        self.ensure_loaded().await?;
        Ok(true)
    }

    /// Load the persisted index or build one, then serve queries from it.
    pub async fn index(&self) -> Result<IndexHandle> {
        let handle = self.indexer.get_or_build().await?;
        self.install(&handle.index).await?;
        Ok(handle)
    }

    /// Rebuild from the sources and swap the new index in.
    ///
    /// On failure the previously loaded index, if any, keeps serving.
    pub async fn force_reindex(&self) -> Result<IndexHandle> {
        let handle = self.indexer.force_reindex().await?;
        self.install(&handle.index).await?;
        Ok(handle)
    }

    /// Current index status.
    pub async fn status(&self) -> Status {
        Status {
            indexed: self.indexer.is_indexed(),
            ready: self.retriever.read().await.is_some(),
        }
    }

    /// Lifecycle state of the underlying indexer.
    pub async fn index_state(&self) -> IndexState {
        self.indexer.state().await
    }

    /// Answer `question` for `user_id`, generating a fresh id when `None`.
    ///
    /// A persisted index is loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotReady`] when no index is persisted, and
    /// propagates retrieval and generation failures.
    #[instrument(skip(self, question))]
    pub async fn ask(&self, user_id: Option<&str>, question: &str) -> Result<Answer> {
        let user_id = match user_id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let retriever = self.ensure_loaded().await?;
        let retrieved = retriever.retrieve(question).await?;
        let answer = self.engine.ask(&user_id, question, &retrieved).await?;

        Ok(Answer {
            answer,
            documents: retrieved.into_iter().map(|r| r.chunk.text).collect(),
            user_id,
        })
    }

    /// `user_id`'s conversation, oldest first.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        self.memory().history(user_id).await
    }

    async fn ensure_loaded(&self) -> Result<Arc<Retriever>> {
        if let Some(retriever) = self.retriever.read().await.as_ref() {
            return Ok(Arc::clone(retriever));
        }

        let mut slot = self.retriever.write().await;
        if let Some(retriever) = slot.as_ref() {
            return Ok(Arc::clone(retriever));
        }
        if !self.indexer.is_indexed() {
            return Err(RagError::NotReady);
        }
        let index = Arc::new(self.indexer.load().await?);
        let retriever = Arc::new(self.retriever_for(&index)?);
        *slot = Some(Arc::clone(&retriever));
        info!(chunk_count = index.len(), "loaded persisted index");
        Ok(retriever)
    }

    async fn install(&self, index: &Arc<PersistentIndex>) -> Result<()> {
        let retriever = Arc::new(self.retriever_for(index)?);
        *self.retriever.write().await = Some(retriever);
        Ok(())
    }

    fn retriever_for(&self, index: &Arc<PersistentIndex>) -> Result<Retriever> {
        let store: Arc<dyn VectorStore> = Arc::clone(index) as Arc<dyn VectorStore>;
        Ok(Retriever::new(
            store,
            Arc::clone(self.indexer.embedding_provider()),
            self.config().top_k,
        )?
        .with_timeout(self.config().request_timeout()))
    }
}

/// Builder for [`PersonalizedRag`].
///
/// The embedding and generation providers are required. A fresh
/// [`ConversationMemory`] bounded by `max_users` is used unless one is given.
#[derive(Default)]
pub struct PersonalizedRagBuilder {
    config: Option<RagConfig>,
    loader: Option<Arc<dyn Loader>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    generation_provider: Option<Arc<dyn GenerationProvider>>,
    memory: Option<Arc<ConversationMemory>>,
}

impl PersonalizedRagBuilder {
    /// Set the configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the document loader.
    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Override the chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the generation provider.
    pub fn generation_provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.generation_provider = Some(provider);
        self
    }

    /// Share an existing conversation memory.
    pub fn memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Build the [`PersonalizedRag`]. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a provider is missing or the
    /// configuration is invalid.
    pub fn build(self) -> Result<PersonalizedRag> {
        let config = self.config.unwrap_or_default();
        let generator = self
            .generation_provider
            .ok_or_else(|| RagError::Config("generation_provider is required".to_string()))?;
        let memory = self.memory.unwrap_or_else(|| {
            let memory = ConversationMemory::new();
            Arc::new(match config.max_users {
                Some(max) => memory.with_max_users(max),
                None => memory,
            })
        });
        let timeout = config.request_timeout();

        let mut indexer = Indexer::builder().config(config);
        if let Some(provider) = self.embedding_provider {
            indexer = indexer.embedding_provider(provider);
        }
        if let Some(loader) = self.loader {
            indexer = indexer.loader(loader);
        }
        if let Some(chunker) = self.chunker {
            indexer = indexer.chunker(chunker);
        }

        Ok(PersonalizedRag {
            indexer: indexer.build()?,
            engine: AnsweringEngine::new(generator, memory).with_timeout(timeout),
            retriever: RwLock::new(None),
        })
    }
}
