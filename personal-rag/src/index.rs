//! Persistent vector index using cosine similarity.
//!
//! A collection lives in `persist_dir/<collection>/` as a `manifest.json`
//! plus a `chunks.json` holding every chunk with its embedding. Builds are
//! written to a hidden staging directory next to `persist_dir` and renamed
//! into place, so a failed build never leaves a partial collection behind and
//! `persist_dir` only ever holds published collections.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{Chunk, SearchResult};
use crate::embedding::{EmbedOptions, EmbeddingProvider, embed_in_batches};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";

/// Metadata describing a persisted collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    /// Collection name.
    pub collection: String,
    /// Embedding dimension shared by every stored vector.
    pub dimensions: usize,
    /// Name of the embedding provider that produced the vectors.
    pub embedding_provider: String,
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// When the collection was built.
    pub created_at: DateTime<Utc>,
}

/// A collection of embedded chunks, loaded in memory and persisted on disk.
///
/// Chunks are kept in insertion order, which is also the tie-break order for
/// equal similarity scores.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::{PersistentIndex, VectorStore};
///
/// let index = PersistentIndex::build(chunks, &embedder, "docs", dir, options).await?;
/// let reopened = PersistentIndex::load("docs", dir, &embedder).await?;
/// let hits = reopened.search(&query, 6).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PersistentIndex {
    manifest: IndexManifest,
    chunks: Vec<Chunk>,
    path: PathBuf,
}

impl PersistentIndex {
    /// Returns `true` iff `persist_dir` exists and contains at least one entry.
    pub fn exists(persist_dir: impl AsRef<Path>) -> bool {
        std::fs::read_dir(persist_dir.as_ref())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Embed every chunk and persist the collection, replacing any existing
    /// collection of the same name under `persist_dir`.
    ///
    /// # Errors
    ///
    /// Embedding errors abort the build before anything is written. I/O
    /// errors while publishing remove the staging directory and are returned
    /// as [`RagError::VectorStore`].
    pub async fn build(
        mut chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        collection: &str,
        persist_dir: impl AsRef<Path>,
        options: EmbedOptions,
    ) -> Result<Self> {
        let persist_dir = persist_dir.as_ref();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embed_in_batches(embedder, &texts, options).await?;
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        debug!(collection, chunk_count = chunks.len(), "embedded chunks");

        let manifest = IndexManifest {
            collection: collection.to_string(),
            dimensions: embedder.dimensions(),
            embedding_provider: embedder.name().to_string(),
            chunk_count: chunks.len(),
            created_at: Utc::now(),
        };

        let created_root = !persist_dir.exists();
        tokio::fs::create_dir_all(persist_dir).await.map_err(store_error)?;

        let path = persist_dir.join(collection);
        let staging = scratch_dir(persist_dir, "staging");
        let retired = scratch_dir(persist_dir, "retired");
        if let Err(e) = publish(&staging, &retired, &path, &manifest, &chunks).await {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            if created_root {
                let _ = tokio::fs::remove_dir(persist_dir).await;
            }
            return Err(e);
        }

        info!(collection, chunk_count = manifest.chunk_count, path = %path.display(), "index built");
        Ok(Self { manifest, chunks, path })
    }

    /// Open a persisted collection without re-embedding anything.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if `persist_dir` is absent or empty, or
    ///   holds no collection of that name.
    /// - [`RagError::DimensionMismatch`] if `embedder` produces vectors of a
    ///   different dimension than the stored ones.
    /// - [`RagError::VectorStore`] if the files are unreadable or corrupt.
    pub async fn load(
        collection: &str,
        persist_dir: impl AsRef<Path>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let persist_dir = persist_dir.as_ref();
        let not_found = || RagError::IndexNotFound {
            collection: collection.to_string(),
            persist_dir: persist_dir.to_path_buf(),
        };
        if !Self::exists(persist_dir) {
            return Err(not_found());
        }
        let path = persist_dir.join(collection);
        if !path.join(MANIFEST_FILE).is_file() {
            return Err(not_found());
        }

        let manifest: IndexManifest = read_json(&path.join(MANIFEST_FILE)).await?;
        if manifest.dimensions != embedder.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: manifest.dimensions,
                actual: embedder.dimensions(),
            });
        }
        if manifest.embedding_provider != embedder.name() {
            warn!(
                stored = %manifest.embedding_provider,
                current = embedder.name(),
                "index was built with a different embedding provider"
            );
        }

        let chunks: Vec<Chunk> = read_json(&path.join(CHUNKS_FILE)).await?;
        if chunks.len() != manifest.chunk_count {
            return Err(RagError::VectorStore(format!(
                "manifest lists {} chunks but {} were stored",
                manifest.chunk_count,
                chunks.len()
            )));
        }
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != manifest.dimensions) {
            return Err(RagError::VectorStore(format!(
                "chunk '{}' has {} dimensions, expected {}",
                bad.id,
                bad.embedding.len(),
                manifest.dimensions
            )));
        }

        info!(collection, chunk_count = chunks.len(), "index loaded");
        Ok(Self { manifest, chunks, path })
    }

    /// The collection manifest.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Directory holding this collection's files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored chunks in insertion order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return the `k` nearest chunks to `vector`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if `vector` has the wrong length.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if vector.len() != self.manifest.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<SearchResult> = self
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: cosine_similarity(&chunk.embedding, vector),
            })
            .collect();

        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }
}

#[async_trait]
impl VectorStore for PersistentIndex {
    async fn search(&self, embedding: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        self.query(embedding, top_k)
    }

    fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn store_error(e: impl std::fmt::Display) -> RagError {
    RagError::VectorStore(e.to_string())
}

/// A unique hidden directory beside `persist_dir`, on the same filesystem.
fn scratch_dir(persist_dir: &Path, kind: &str) -> PathBuf {
    let name = persist_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let scratch = format!(".{name}.{kind}-{}", Uuid::new_v4());
    match persist_dir.parent() {
        Some(parent) => parent.join(scratch),
        None => persist_dir.join(scratch),
    }
}

/// Write the collection into `staging`, then swap it in for `target`,
/// moving any previous collection aside to `retired` until the swap succeeds.
async fn publish(
    staging: &Path,
    retired: &Path,
    target: &Path,
    manifest: &IndexManifest,
    chunks: &[Chunk],
) -> Result<()> {
    tokio::fs::create_dir(staging).await.map_err(store_error)?;
    let chunks_json = serde_json::to_vec(chunks).map_err(store_error)?;
    let manifest_json = serde_json::to_vec_pretty(manifest).map_err(store_error)?;
    tokio::fs::write(staging.join(CHUNKS_FILE), chunks_json).await.map_err(store_error)?;
    tokio::fs::write(staging.join(MANIFEST_FILE), manifest_json).await.map_err(store_error)?;

    let retired = if tokio::fs::try_exists(target).await.map_err(store_error)? {
        tokio::fs::rename(target, retired).await.map_err(store_error)?;
        Some(retired)
    } else {
        None
    };

    if let Err(e) = tokio::fs::rename(staging, target).await {
        if let Some(retired) = &retired {
            let _ = tokio::fs::rename(retired, target).await;
        }
        return Err(store_error(e));
    }
    if let Some(retired) = retired {
        if let Err(e) = tokio::fs::remove_dir_all(retired).await {
            warn!(path = %retired.display(), error = %e, "failed to remove previous collection");
        }
    }
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RagError::VectorStore(format!("failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RagError::VectorStore(format!("corrupt {}: {e}", path.display())))
}
