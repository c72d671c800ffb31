//! In-memory state backend

use super::{State, StateProvider};
use crate::db::PersistenceResult;
use crate::event::ChatId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Conversation overrides layered over the bot's default state.
///
/// A single store-wide lock: loads only take the read side, so loads of
/// different conversations never wait on each other.
pub struct MemoryStateProvider {
    defaults: HashMap<String, String>,
    conversations: RwLock<HashMap<ChatId, HashMap<String, String>>>,
    writes: AtomicU64,
}

impl MemoryStateProvider {
    pub fn new(defaults: HashMap<String, String>) -> Self {
        Self {
            defaults,
            conversations: RwLock::new(HashMap::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Number of key writes and deletes applied since creation
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStateProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl StateProvider for MemoryStateProvider {
    async fn load(&self, chat: ChatId, state: &mut State) -> PersistenceResult<()> {
        let conversations = self
            .conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match conversations.get(&chat) {
            Some(data) => state.fill(data.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            None => state.fill(self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        }
        Ok(())
    }

    async fn update(&self, chat: ChatId, state: &State) -> PersistenceResult<()> {
        let changes = state.changes();
        if changes.is_empty() {
            return Ok(());
        }

        let mut conversations = self
            .conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let data = conversations
            .entry(chat)
            .or_insert_with(|| self.defaults.clone());

        let mut applied = 0u64;
        for key in &changes.added {
            if let Some(value) = state.get(key) {
                data.insert(key.clone(), value.to_string());
                applied += 1;
            }
        }
        for key in &changes.removed {
            data.remove(key);
            applied += 1;
        }
        self.writes.fetch_add(applied, Ordering::Relaxed);

        tracing::debug!(chat_id = %chat, writes = applied, "State updated in memory");
        Ok(())
    }
}
