//! Document chunking.
//!
//! [`RecursiveChunker`] splits text on a hierarchy of separators (paragraph,
//! line, sentence, word, character), using the coarsest separator that keeps
//! pieces within `chunk_size` and falling back to finer ones only for pieces
//! that are still too long. Adjacent pieces are then merged back up to
//! `chunk_size`, carrying up to `chunk_overlap` units from the tail of one
//! chunk into the head of the next.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::document::{CHUNK_INDEX_KEY, Chunk, Document, SOURCE_KEY};
use crate::error::{RagError, Result};

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later when the index is built.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Chunking`] if the document cannot be chunked.
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// The unit `chunk_size` and `chunk_overlap` are measured in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LengthFunction {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// Whitespace-separated words, a rough stand-in for tokenizer tokens.
    Words,
}

impl LengthFunction {
    /// Length of `text` in this unit.
    pub fn measure(&self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Words => text.split_whitespace().count(),
        }
    }
}

/// Splits text recursively by separator hierarchy with overlap.
///
/// Chunk IDs are `{document_id}_{chunk_index}`. Each chunk inherits the
/// parent document's metadata plus `source` and `chunk_index`. The output is
/// a pure function of the input text and parameters.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(250, 0)?;
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    length: LengthFunction,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` measuring length in characters.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum length per chunk
    /// * `chunk_overlap` — length shared between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            length: LengthFunction::Chars,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Measure chunk length with a different unit.
    pub fn with_length_function(mut self, length: LengthFunction) -> Self {
        self.length = length;
        self
    }

    /// Replace the separator hierarchy (coarsest first).
    pub fn with_separators(mut self, separators: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if self.length.measure(text) <= self.chunk_size {
            return vec![text.to_string()];
        }

        let position = separators.iter().position(|s| s.is_empty() || text.contains(s));
        let Some(position) = position else {
            return vec![text.to_string()];
        };
        let separator = separators[position];
        let finer = &separators[position + 1..];

        let pieces = split_keeping_separator(text, separator);
        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if self.length.measure(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Merge small pieces into chunks of at most `chunk_size`, keeping up to
    /// `chunk_overlap` trailing units of each chunk at the head of the next.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = self.length.measure(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                chunks.push(window.iter().map(|(s, _)| *s).collect::<String>());
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        if !window.is_empty() {
            chunks.push(window.iter().map(|(s, _)| *s).collect::<String>());
        }
        chunks
    }
}

/// Split text at a separator while keeping the separator attached to the
/// preceding segment. The empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        if document.text.contains('\0') {
            return Err(RagError::Chunking(format!(
                "document '{}' contains binary data",
                document.id()
            )));
        }
        if document.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let chunks = self
            .split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(SOURCE_KEY.to_string(), document.id().to_string());
                metadata.insert(CHUNK_INDEX_KEY.to_string(), i.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id()),
                    text,
                    embedding: Vec::new(),
                    metadata,
                }
            })
            .collect();
        Ok(chunks)
    }
}
