//! Personalized retrieval-augmented question answering.
//!
//! This crate provides:
//! - Local file and URL loading with per-URL failure reporting
//! - Recursive separator-based chunking with overlap
//! - A persistent, atomically published vector index
//! - Top-k cosine retrieval
//! - Per-user conversation memory
//! - Answer generation grounded in retrieved chunks and prior turns
//!
//! Embedding and generation backends plug in through the
//! [`EmbeddingProvider`] and [`GenerationProvider`] traits. HuggingFace and
//! Gemini implementations are included.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use personal_rag::{
//!     GeminiGenerationProvider, HuggingFaceEmbeddingProvider, PersonalizedRag, RagConfig,
//! };
//!
//! let rag = PersonalizedRag::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_provider(Arc::new(HuggingFaceEmbeddingProvider::from_env()?))
//!     .generation_provider(Arc::new(GeminiGenerationProvider::from_env()?))
//!     .build()?;
//!
//! rag.index().await?;
//! let answer = rag.ask(Some("joel"), "Who is Raul?").await?;
//! println!("{}", answer.answer);
//! ```

mod chunking;
mod config;
mod document;
mod embedding;
mod engine;
mod error;
mod gemini;
mod generation;
mod huggingface;
mod index;
mod indexer;
mod loader;
mod memory;
mod prompt;
mod rag;
mod retriever;
mod vectorstore;

pub use chunking::{Chunker, DEFAULT_SEPARATORS, LengthFunction, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{CHUNK_INDEX_KEY, Chunk, Document, DocumentSource, SOURCE_KEY, SearchResult};
pub use embedding::{EmbedOptions, EmbeddingProvider};
pub use engine::AnsweringEngine;
pub use error::{RagError, Result};
pub use gemini::GeminiGenerationProvider;
pub use generation::{GenerationProvider, Message, Role};
pub use huggingface::HuggingFaceEmbeddingProvider;
pub use index::{IndexManifest, PersistentIndex};
pub use indexer::{BuildReport, IndexHandle, IndexState, Indexer, IndexerBuilder, SkippedDocument};
pub use loader::{DocumentLoader, LoadReport, Loader, UrlOutcome};
pub use memory::{ConversationMemory, Turn};
pub use prompt::{SYSTEM_DIRECTIVE, build_instructions, format_documents, format_history};
pub use rag::{Answer, PersonalizedRag, PersonalizedRagBuilder, Status};
pub use retriever::Retriever;
pub use vectorstore::VectorStore;
