//! Hugging Face embedding provider using the Inference feature-extraction API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Base URL of the hosted inference router.
const HF_INFERENCE_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// The default sentence-embedding model.
const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// The dimensionality of `all-MiniLM-L6-v2`.
const DEFAULT_DIMENSIONS: usize = 384;

const PROVIDER: &str = "HuggingFace";

/// An [`EmbeddingProvider`] backed by the Hugging Face Inference API.
///
/// Uses `reqwest` to call the `feature-extraction` pipeline for the configured
/// model. When the model returns token-level output, the first row is used as
/// the text embedding.
///
/// # Configuration
///
/// - `model` – defaults to `sentence-transformers/all-MiniLM-L6-v2`.
/// - `dimensions` – defaults to 384; set it to match any other model.
/// - `token` – from the constructor or the `HF_TOKEN` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::HuggingFaceEmbeddingProvider;
///
/// let provider = HuggingFaceEmbeddingProvider::from_env()?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct HuggingFaceEmbeddingProvider {
    client: reqwest::Client,
    token: String,
    model: String,
    dimensions: usize,
    base_url: String,
}

impl HuggingFaceEmbeddingProvider {
    /// Create a new provider with the given access token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(RagError::Provider {
                provider: PROVIDER.into(),
                message: "access token must not be empty".into(),
            });
        }

        Ok(Self {
            client: reqwest::Client::new(),
            token,
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            base_url: HF_INFERENCE_URL.into(),
        })
    }

    /// Create a new provider from `HF_TOKEN`, honouring `HF_EMBEDDING_MODEL`
    /// and `HF_EMBEDDING_DIMENSIONS` when set.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("HF_TOKEN").map_err(|_| RagError::Provider {
            provider: PROVIDER.into(),
            message: "HF_TOKEN environment variable not set".into(),
        })?;
        let mut provider = Self::new(token)?;
        if let Ok(model) = std::env::var("HF_EMBEDDING_MODEL") {
            provider = provider.with_model(model);
        }
        if let Some(dims) =
            std::env::var("HF_EMBEDDING_DIMENSIONS").ok().and_then(|d| d.parse().ok())
        {
            provider = provider.with_dimensions(dims);
        }
        Ok(provider)
    }

    /// Set the model repository id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Declare the output dimensions of the configured model.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// Point the provider at a different inference endpoint.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/pipeline/feature-extraction",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

// ── Inference API request/response types ───────────────────────────

#[derive(Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeatureOutput {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
}

impl FeatureOutput {
    fn into_embedding(self) -> Option<Vec<f32>> {
        match self {
            Self::Pooled(v) => Some(v),
            Self::Tokens(rows) => rows.into_iter().next(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Provider {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(&FeatureRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::Provider { provider: PROVIDER.into(), message: format!("request failed: {e}") }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::Provider {
                provider: PROVIDER.into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let outputs: Vec<FeatureOutput> = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::Provider {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        outputs
            .into_iter()
            .map(|o| {
                o.into_embedding().ok_or_else(|| RagError::Provider {
                    provider: PROVIDER.into(),
                    message: "API returned an empty embedding".into(),
                })
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
