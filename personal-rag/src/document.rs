//! Data types for documents, chunks, and search results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the document's source (file path or URL).
pub const SOURCE_KEY: &str = "source";

/// Metadata key holding a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Where a [`Document`] came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum DocumentSource {
    /// A local text file.
    File(String),
    /// A fetched web page.
    Url(String),
}

impl DocumentSource {
    /// The path or URL as a plain string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::File(path) => path,
            Self::Url(url) => url,
        }
    }
}

/// A loaded source document. Discarded once it has been chunked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// The text content of the document.
    pub text: String,
    /// The file path or URL the text was read from.
    pub source: DocumentSource,
    /// Fetch metadata such as `title` or `content_type`.
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document with no extra metadata.
    pub fn new(text: impl Into<String>, source: DocumentSource) -> Self {
        Self { text: text.into(), source, metadata: BTreeMap::new() }
    }

    /// Stable identifier used to derive chunk IDs.
    pub fn id(&self) -> &str {
        self.source.as_str()
    }
}

/// A bounded segment of a [`Document`].
///
/// `embedding` is empty until the chunk has been embedded for an index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Parent document metadata plus `source` and `chunk_index`.
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// The source path or URL this chunk was cut from.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A retrieved [`Chunk`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity (higher is more relevant).
    pub score: f32,
}
