//! Generation provider trait for producing answers from a prompt.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The model's reply.
    Assistant,
}

impl Role {
    /// Lowercase label used when serializing history into a prompt.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message passed to a [`GenerationProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Who sent the message.
    pub role: Role,
    /// The message text.
    pub text: String,
}

impl Message {
    /// Create a message.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, text: text.into() }
    }
}

/// A provider that turns a system instruction plus a user turn into text.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::GenerationProvider;
///
/// let answer = provider.generate("Be brief.", &[], "Who is Raul?").await?;
/// ```
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a reply to `user_text`, conditioned on `system_text` and any
    /// earlier `history` messages (oldest first).
    async fn generate(&self, system_text: &str, history: &[Message], user_text: &str)
    -> Result<String>;

    /// Short name used in logs and errors.
    fn name(&self) -> &str {
        "generation"
    }
}

/// Run a generation call under an optional budget, mapping an elapsed budget
/// to [`RagError::GenerationTimeout`].
pub(crate) async fn with_generation_budget<T, F>(
    provider: &str,
    budget: Option<Duration>,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match budget {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| RagError::GenerationTimeout { provider: provider.to_string(), timeout })?,
        None => call.await,
    }
}
