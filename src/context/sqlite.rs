//! Relational context backend

use super::ContextStore;
use crate::db::{Database, PersistenceResult};
use crate::event::ChatId;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

#[derive(Clone)]
pub struct SqliteContextStore {
    db: Database,
    bot_id: i64,
}

impl SqliteContextStore {
    pub fn new(db: Database, bot_id: i64) -> Self {
        Self { db, bot_id }
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn get(&self, chat: ChatId) -> PersistenceResult<Option<String>> {
        self.db.transactional(|tx| {
            let value = tx
                .query_row(
                    "SELECT value FROM bot_context WHERE bot_id = ?1 AND chat_id = ?2",
                    params![self.bot_id, chat.as_i64()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    async fn set(&self, chat: ChatId, value: &str) -> PersistenceResult<()> {
        self.db.transactional(|tx| {
            tx.execute(
                "INSERT INTO bot_context (bot_id, chat_id, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (bot_id, chat_id) DO UPDATE SET value = excluded.value",
                params![self.bot_id, chat.as_i64(), value],
            )?;
            Ok(())
        })
    }

    async fn reset(&self, chat: ChatId) -> PersistenceResult<()> {
        self.db.transactional(|tx| {
            tx.execute(
                "DELETE FROM bot_context WHERE bot_id = ?1 AND chat_id = ?2",
                params![self.bot_id, chat.as_i64()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_reset() {
        let store = SqliteContextStore::new(Database::open_in_memory().unwrap(), 1);
        assert_eq!(store.get(ChatId(5)).await.unwrap(), None);

        store.set(ChatId(5), "menu").await.unwrap();
        store.set(ChatId(5), "checkout").await.unwrap();
        assert_eq!(store.get(ChatId(5)).await.unwrap().as_deref(), Some("checkout"));
        assert_eq!(store.get(ChatId(6)).await.unwrap(), None);

        store.reset(ChatId(5)).await.unwrap();
        assert_eq!(store.get(ChatId(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_of_unset_context_is_ok() {
        let store = SqliteContextStore::new(Database::open_in_memory().unwrap(), 1);
        store.reset(ChatId(1)).await.unwrap();
    }
}
