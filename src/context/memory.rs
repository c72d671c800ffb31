//! In-memory context backend

use super::ContextStore;
use crate::db::PersistenceResult;
use crate::event::ChatId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
pub struct MemoryContextStore {
    values: RwLock<HashMap<ChatId, String>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn get(&self, chat: ChatId) -> PersistenceResult<Option<String>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&chat).cloned())
    }

    async fn set(&self, chat: ChatId, value: &str) -> PersistenceResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(chat, value.to_string());
        Ok(())
    }

    async fn reset(&self, chat: ChatId) -> PersistenceResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(&chat);
        Ok(())
    }
}
