//! Gemini generation provider using the `generateContent` REST endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, Message, Role};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "Gemini";

/// A [`GenerationProvider`] backed by the Gemini API.
///
/// The system text is sent as `systemInstruction`; history and the user turn
/// become `contents`, with assistant turns mapped to Gemini's `model` role.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::GeminiGenerationProvider;
///
/// let provider = GeminiGenerationProvider::from_env()?;
/// let answer = provider.generate("Be brief.", &[], "hello").await?;
/// ```
pub struct GeminiGenerationProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
}

impl GeminiGenerationProvider {
    /// Create a new provider with the given API key and the default
    /// `gemini-2.5-flash` model at temperature 1.0.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Generation {
                provider: PROVIDER.into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.into(),
            temperature: 1.0,
            base_url: GEMINI_BASE_URL.into(),
        })
    }

    /// Create a new provider from `GOOGLE_API_KEY`, honouring `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY").map_err(|_| RagError::Generation {
            provider: PROVIDER.into(),
            message: "GOOGLE_API_KEY environment variable not set".into(),
        })?;
        let provider = Self::new(api_key)?;
        Ok(match std::env::var("GEMINI_MODEL") {
            Ok(model) => provider.with_model(model),
            Err(_) => provider,
        })
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Point the provider at a different API root.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), self.model)
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn text_content<'a>(role: Option<&'a str>, text: &str) -> Content<'a> {
    Content { role, parts: vec![Part { text: text.to_string() }] }
}

fn build_request<'a>(
    system_text: &'a str,
    history: &'a [Message],
    user_text: &'a str,
    temperature: f32,
) -> GenerateRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            text_content(Some(role), &m.text)
        })
        .collect();
    contents.push(text_content(Some("user"), user_text));

    GenerateRequest {
        system_instruction: text_content(None, system_text),
        contents,
        generation_config: GenerationConfig { temperature },
    }
}

// ── GenerationProvider implementation ──────────────────────────────

#[async_trait]
impl GenerationProvider for GeminiGenerationProvider {
    async fn generate(
        &self,
        system_text: &str,
        history: &[Message],
        user_text: &str,
    ) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, history_len = history.len(), "generating");

        let request = build_request(system_text, history, user_text, self.temperature);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::Generation {
                    provider: PROVIDER.into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(RagError::Generation {
                provider: PROVIDER.into(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::Generation {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(RagError::Generation {
                provider: PROVIDER.into(),
                message: "response contained no text".into(),
            });
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_maps_assistant_turns_to_model_role() {
        let history = vec![Message::new(Role::User, "hi"), Message::new(Role::Assistant, "hello")];
        let request = build_request("sys", &history, "who?", 1.0);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["role"], "user");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "who?");
        assert_eq!(json["generationConfig"]["temperature"], 1.0);
    }

    #[test]
    fn endpoint_uses_model_name() {
        let provider = GeminiGenerationProvider::new("k").unwrap().with_model("gemini-x");
        assert!(provider.endpoint().ends_with("/models/gemini-x:generateContent"));
    }

    #[test]
    fn rejects_empty_key() {
        assert!(GeminiGenerationProvider::new("").is_err());
    }
}
