//! Configuration for indexing, retrieval, and answering.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Configuration parameters for the personalized RAG system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// File or directory of text files to index.
    pub source_path: PathBuf,
    /// Web pages to index alongside the local files.
    pub urls: Vec<String>,
    /// Directory holding the persisted vector index.
    pub persist_dir: PathBuf,
    /// Name of the collection inside `persist_dir`.
    pub collection_name: String,
    /// Maximum chunk length, in units of the chunker's length function.
    pub chunk_size: usize,
    /// Units shared between consecutive chunks of one document.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Number of texts sent to the embedding provider per request.
    pub embed_batch_size: usize,
    /// `User-Agent` header sent when fetching URLs.
    pub user_agent: String,
    /// File extensions (without the dot) treated as text in directory mode.
    pub text_extensions: Vec<String>,
    /// Budget applied to each embedding and generation call.
    pub request_timeout_secs: Option<u64>,
    /// Maximum number of users whose history is kept in memory.
    pub max_users: Option<usize>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/user_information/"),
            urls: Vec::new(),
            persist_dir: PathBuf::from("./chroma_db"),
            collection_name: "my_text_docs".to_string(),
            chunk_size: 250,
            chunk_overlap: 0,
            top_k: 6,
            embed_batch_size: 8,
            user_agent: "MyCustomAgent/1.0".to_string(),
            text_extensions: vec!["txt".to_string()],
            request_timeout_secs: None,
            max_users: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from `RAG_*` environment variables, falling back
    /// to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable is set but unparsable, or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("RAG_SOURCE_PATH") {
            config.source_path = PathBuf::from(path);
        }
        if let Ok(urls) = std::env::var("RAG_URLS") {
            config.urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(dir) = std::env::var("RAG_PERSIST_DIR") {
            config.persist_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("RAG_COLLECTION") {
            config.collection_name = name;
        }
        if let Ok(agent) = std::env::var("RAG_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(size) = env_parse("RAG_CHUNK_SIZE")? {
            config.chunk_size = size;
        }
        if let Some(overlap) = env_parse("RAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = overlap;
        }
        if let Some(k) = env_parse("RAG_TOP_K")? {
            config.top_k = k;
        }
        if let Some(batch) = env_parse("RAG_EMBED_BATCH_SIZE")? {
            config.embed_batch_size = batch;
        }
        config.request_timeout_secs = env_parse("RAG_REQUEST_TIMEOUT_SECS")?;
        config.max_users = env_parse("RAG_MAX_USERS")?;

        RagConfigBuilder { config }.build()
    }

    /// The per-call provider budget, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0`
    /// - `collection_name` is empty or contains a path separator
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::Config("embed_batch_size must be greater than zero".to_string()));
        }
        if self.collection_name.is_empty()
            || self.collection_name.contains(['/', '\\'])
            || self.collection_name.starts_with('.')
        {
            return Err(RagError::Config(format!(
                "invalid collection name '{}'",
                self.collection_name
            )));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| RagError::Config(format!("{key} has an invalid value: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the file or directory to index.
    pub fn source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_path = path.into();
        self
    }

    /// Set the URLs to index.
    pub fn urls(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the persistence directory.
    pub fn persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.persist_dir = dir.into();
        self
    }

    /// Set the collection name.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.config.collection_name = name.into();
        self
    }

    /// Set the maximum chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set how many texts go to the embedding provider per request.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Set the `User-Agent` header used when fetching URLs.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set the file extensions treated as text in directory mode.
    pub fn text_extensions(mut self, exts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.text_extensions = exts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-call provider budget.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Cap the number of users whose history is retained.
    pub fn max_users(mut self, max: usize) -> Self {
        self.config.max_users = Some(max);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
