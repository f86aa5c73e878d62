//! Deterministic providers shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use personal_rag::{EmbeddingProvider, GenerationProvider, Message, RagError, Result};

pub const DIM: usize = 32;

/// Bag-of-words embedder: each lowercase word adds 1.0 to a hashed bucket.
/// Texts sharing words get positive cosine similarity.
#[derive(Default)]
pub struct HashEmbedder {
    fail: AtomicBool,
}

impl HashEmbedder {
    pub fn failing() -> Self {
        Self { fail: AtomicBool::new(true) }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
        v[bucket % DIM] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Provider {
                provider: "hash".to_string(),
                message: "backend unavailable".to_string(),
            });
        }
        Ok(hash_embed(text))
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Generator that records every system instruction and echoes a scripted reply.
#[derive(Default)]
pub struct RecordingGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    pub delay: Option<Duration>,
}

impl RecordingGenerator {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationProvider for RecordingGenerator {
    async fn generate(
        &self,
        system_text: &str,
        _history: &[Message],
        user_text: &str,
    ) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Generation {
                provider: "recording".to_string(),
                message: "quota exceeded".to_string(),
            });
        }
        self.prompts.lock().unwrap().push(system_text.to_string());
        Ok(format!("answer to: {user_text}"))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).unwrap();
}
