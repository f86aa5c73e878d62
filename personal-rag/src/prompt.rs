//! System instruction assembly.

use crate::document::SearchResult;
use crate::memory::Turn;

/// Fixed directive placed at the top of every instruction block.
pub const SYSTEM_DIRECTIVE: &str = "You are a helpful assistant.
Use the following documents to answer the user's questions.
If you don't know the answer, just say so.
Use three sentences maximum.
Include context from previous conversation.";

/// Render prior turns as `role: text` lines, oldest first.
pub fn format_history(history: &[Turn]) -> String {
    history.iter().map(|t| format!("{}: {}", t.role, t.text)).collect::<Vec<_>>().join("\n")
}

/// Concatenate retrieved chunk texts in retrieval order, one per line.
/// Duplicates are kept.
pub fn format_documents(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n")
}

/// Build the system instruction for one question.
pub fn build_instructions(history: &[Turn], results: &[SearchResult]) -> String {
    format!(
        "{SYSTEM_DIRECTIVE}\n\nPrevious conversation:\n{}\n\nDocuments:\n{}",
        format_history(history),
        format_documents(results)
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::document::Chunk;
    use crate::generation::Role;

    fn hit(text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: text.to_string(),
                text: text.to_string(),
                embedding: Vec::new(),
                metadata: BTreeMap::new(),
            },
            score,
        }
    }

    #[test]
    fn history_is_role_prefixed_and_chronological() {
        let now = Utc::now();
        let history = vec![
            Turn { role: Role::User, text: "Who is Raul?".into(), at: now },
            Turn { role: Role::Assistant, text: "A cat.".into(), at: now },
        ];
        assert_eq!(format_history(&history), "user: Who is Raul?\nassistant: A cat.");
    }

    #[test]
    fn documents_keep_retrieval_order_and_duplicates() {
        let results = vec![hit("b", 0.9), hit("a", 0.5), hit("b", 0.4)];
        assert_eq!(format_documents(&results), "b\na\nb");
    }

    #[test]
    fn instructions_contain_every_section() {
        let prompt = build_instructions(&[], &[hit("Joel is a friend of Raul, a cat.", 1.0)]);
        assert!(prompt.starts_with(SYSTEM_DIRECTIVE));
        assert!(prompt.contains("Previous conversation:\n\n"));
        assert!(prompt.ends_with("Documents:\nJoel is a friend of Raul, a cat."));
    }
}
