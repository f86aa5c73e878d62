//! Per-user conversation memory.
//!
//! Each user id maps to its own slot holding an ordered turn log and a turn
//! lock. The map lock is only held to find or create a slot, so users never
//! contend with each other beyond that lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::generation::{Message, Role};

/// One entry of a user's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub text: String,
    /// When the turn was recorded.
    pub at: DateTime<Utc>,
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Message::new(turn.role, turn.text.clone())
    }
}

#[derive(Debug, Default)]
struct UserSlot {
    turns: Mutex<Vec<Turn>>,
    turn_lock: Arc<Mutex<()>>,
    last_used: AtomicU64,
}

impl UserSlot {
    /// Held or awaited by a turn, or borrowed outside the map.
    fn in_use(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) > 1 || Arc::strong_count(&self.turn_lock) > 1
    }
}

/// Conversation histories keyed by an opaque user id.
///
/// Unbounded by default. With [`with_max_users`](Self::with_max_users) the
/// least recently used user's whole history is evicted when a new user
/// would exceed the bound. Users with a turn in flight are never evicted,
/// so the bound can be exceeded while every history is busy.
///
/// # Example
///
/// ```rust,ignore
/// use personal_rag::{ConversationMemory, Role};
///
/// let memory = ConversationMemory::new();
/// memory.append("u1", Role::User, "hi").await;
/// assert_eq!(memory.history("u1").await.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ConversationMemory {
    users: RwLock<HashMap<String, Arc<UserSlot>>>,
    max_users: Option<usize>,
    clock: AtomicU64,
}

impl ConversationMemory {
    /// Create an unbounded memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_users` histories (minimum 1).
    pub fn with_max_users(mut self, max_users: usize) -> Self {
        self.max_users = Some(max_users.max(1));
        self
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    async fn slot(&self, user_id: &str) -> Arc<UserSlot> {
        let now = self.tick();
        if let Some(slot) = self.users.read().await.get(user_id) {
            slot.last_used.store(now, Ordering::Relaxed);
            return Arc::clone(slot);
        }

        let mut users = self.users.write().await;
        if let Some(slot) = users.get(user_id) {
            slot.last_used.store(now, Ordering::Relaxed);
            return Arc::clone(slot);
        }
        if let Some(max) = self.max_users {
            while users.len() >= max {
                let oldest = users
                    .iter()
                    .filter(|(_, slot)| !slot.in_use())
                    .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        debug!(user_id = %id, "evicting least recently used history");
                        users.remove(&id);
                    }
                    None => {
                        debug!(users = users.len(), max, "every history is in use; not evicting");
                        break;
                    }
                }
            }
        }
        let slot = Arc::new(UserSlot::default());
        slot.last_used.store(now, Ordering::Relaxed);
        users.insert(user_id.to_string(), Arc::clone(&slot));
        slot
    }

    /// Append one turn to `user_id`'s history, creating it on first use.
    pub async fn append(&self, user_id: &str, role: Role, text: impl Into<String>) {
        let slot = self.slot(user_id).await;
        slot.turns.lock().await.push(Turn { role, text: text.into(), at: Utc::now() });
    }

    /// Append a question and its answer as one step, so readers never see
    /// the question without the answer.
    pub async fn append_exchange(
        &self,
        user_id: &str,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) {
        let slot = self.slot(user_id).await;
        let at = Utc::now();
        let mut turns = slot.turns.lock().await;
        turns.push(Turn { role: Role::User, text: question.into(), at });
        turns.push(Turn { role: Role::Assistant, text: answer.into(), at });
    }

    /// `user_id`'s turns, oldest first. Empty for an unseen user.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        let slot = self.users.read().await.get(user_id).cloned();
        match slot {
            Some(slot) => slot.turns.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Serialize whole question/answer cycles for one user.
    ///
    /// The returned guard is independent of the history lock, so holding it
    /// across a slow provider call blocks only later turns of the same user.
    pub async fn begin_turn(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.slot(user_id).await.turn_lock);
        lock.lock_owned().await
    }

    /// Number of users with a history.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn unseen_user_has_empty_history() {
        let memory = ConversationMemory::new();
        assert!(memory.history("nobody").await.is_empty());
        assert_eq!(memory.user_count().await, 0);
    }

    #[tokio::test]
    async fn turns_are_kept_in_order_per_user() {
        let memory = ConversationMemory::new();
        memory.append_exchange("u1", "q1", "a1").await;
        memory.append("u2", Role::User, "other").await;
        memory.append_exchange("u1", "q2", "a2").await;

        let texts: Vec<(Role, String)> =
            memory.history("u1").await.into_iter().map(|t| (t.role, t.text)).collect();
        assert_eq!(
            texts,
            vec![
                (Role::User, "q1".to_string()),
                (Role::Assistant, "a1".to_string()),
                (Role::User, "q2".to_string()),
                (Role::Assistant, "a2".to_string()),
            ]
        );
        assert_eq!(memory.history("u2").await.len(), 1);
    }

    #[tokio::test]
    async fn bounded_memory_evicts_least_recently_used_user() {
        let memory = ConversationMemory::new().with_max_users(2);
        memory.append("a", Role::User, "1").await;
        memory.append("b", Role::User, "2").await;
        memory.append("a", Role::User, "3").await;
        memory.append("c", Role::User, "4").await;

        assert_eq!(memory.user_count().await, 2);
        assert!(memory.history("b").await.is_empty());
        assert_eq!(memory.history("a").await.len(), 2);
        assert_eq!(memory.history("c").await.len(), 1);
    }

    #[tokio::test]
    async fn begin_turn_serializes_same_user() {
        let memory = Arc::new(ConversationMemory::new());
        let guard = memory.begin_turn("u").await;

        let other = Arc::clone(&memory);
        let waiter = tokio::spawn(async move {
            let _g = other.begin_turn("u").await;
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // a different user is not blocked
        let _free = memory.begin_turn("v").await;

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn eviction_skips_user_with_turn_in_flight() {
        let memory = ConversationMemory::new().with_max_users(1);
        memory.append("a", Role::User, "kept").await;
        let guard = memory.begin_turn("a").await;

        memory.append("b", Role::User, "new").await;
        assert_eq!(memory.history("a").await.len(), 1);
        assert_eq!(memory.user_count().await, 2);

        let second = tokio::time::timeout(Duration::from_millis(200), memory.begin_turn("a")).await;
        assert!(second.is_err(), "a second turn for the same user must wait");

        drop(guard);
        let _next = memory.begin_turn("a").await;
        memory.append("c", Role::User, "newest").await;
        assert!(memory.history("b").await.is_empty());
        assert_eq!(memory.history("a").await.len(), 1);
    }
}
