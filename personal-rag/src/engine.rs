//! Answer generation with per-user conversation memory.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::document::SearchResult;
use crate::error::Result;
use crate::generation::{GenerationProvider, with_generation_budget};
use crate::memory::ConversationMemory;
use crate::prompt::build_instructions;

/// Answers questions from retrieved chunks and the asker's prior turns.
///
/// Calls for the same user id run one at a time; calls for different users
/// run in parallel. Memory is updated only after the provider returns an
/// answer, and the question and answer are recorded together.
pub struct AnsweringEngine {
    generator: Arc<dyn GenerationProvider>,
    memory: Arc<ConversationMemory>,
    timeout: Option<Duration>,
}

impl AnsweringEngine {
    /// Create an engine writing into `memory`.
    pub fn new(generator: Arc<dyn GenerationProvider>, memory: Arc<ConversationMemory>) -> Self {
        Self { generator, memory, timeout: None }
    }

    /// Apply a budget to each generation call.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The memory this engine reads from and appends to.
    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Answer `question` for `user_id` using `retrieved` as context.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`](crate::RagError::Generation) or
    /// [`RagError::GenerationTimeout`](crate::RagError::GenerationTimeout);
    /// the user's history is left untouched in both cases.
    pub async fn ask(
        &self,
        user_id: &str,
        question: &str,
        retrieved: &[SearchResult],
    ) -> Result<String> {
        let _turn = self.memory.begin_turn(user_id).await;

        let history = self.memory.history(user_id).await;
        let instructions = build_instructions(&history, retrieved);

        let answer = with_generation_budget(
            self.generator.name(),
            self.timeout,
            self.generator.generate(&instructions, &[], question),
        )
        .await
        .inspect_err(|e| error!(user_id, error = %e, "generation failed"))?;

        self.memory.append_exchange(user_id, question, answer.as_str()).await;
        info!(
            user_id,
            history_len = history.len() + 2,
            context_chunks = retrieved.len(),
            "answered question"
        );
        Ok(answer)
    }
}
