//! Relational state backend

use super::{State, StateProvider};
use crate::db::{Database, PersistenceResult};
use crate::event::ChatId;
use async_trait::async_trait;
use rusqlite::params;

/// Flat per-conversation key/value rows, scoped by bot id
///
/// There is no default layer: a load yields exactly the stored rows.
#[derive(Clone)]
pub struct SqliteStateProvider {
    db: Database,
    bot_id: i64,
}

impl SqliteStateProvider {
    pub fn new(db: Database, bot_id: i64) -> Self {
        Self { db, bot_id }
    }
}

#[async_trait]
impl StateProvider for SqliteStateProvider {
    async fn load(&self, chat: ChatId, state: &mut State) -> PersistenceResult<()> {
        let rows = self.db.transactional(|tx| {
            let mut stmt =
                tx.prepare("SELECT key, value FROM bot_state WHERE bot_id = ?1 AND chat_id = ?2")?;
            let rows = stmt
                .query_map(params![self.bot_id, chat.as_i64()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        state.fill(rows);
        Ok(())
    }

    async fn update(&self, chat: ChatId, state: &State) -> PersistenceResult<()> {
        let changes = state.changes();
        if changes.is_empty() {
            return Ok(());
        }

        self.db.transactional(|tx| {
            if !changes.removed.is_empty() {
                let mut stmt = tx.prepare(
                    "DELETE FROM bot_state WHERE bot_id = ?1 AND chat_id = ?2 AND key = ?3",
                )?;
                for key in &changes.removed {
                    tracing::debug!(bot_id = self.bot_id, chat_id = %chat, key = %key, "Delete state key");
                    stmt.execute(params![self.bot_id, chat.as_i64(), key])?;
                }
            }
            if !changes.added.is_empty() {
                let mut stmt = tx.prepare(
                    "INSERT INTO bot_state (bot_id, chat_id, key, value) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (bot_id, chat_id, key) DO UPDATE SET value = excluded.value",
                )?;
                for key in &changes.added {
                    let Some(value) = state.get(key) else {
                        continue;
                    };
                    tracing::debug!(bot_id = self.bot_id, chat_id = %chat, key = %key, "Upsert state key");
                    stmt.execute(params![self.bot_id, chat.as_i64(), key, value])?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every row-level write into `write_log`
    const WRITE_LOG: &str = r"
        CREATE TABLE write_log (op TEXT NOT NULL);
        CREATE TRIGGER log_insert AFTER INSERT ON bot_state BEGIN INSERT INTO write_log VALUES ('insert'); END;
        CREATE TRIGGER log_update AFTER UPDATE ON bot_state BEGIN INSERT INTO write_log VALUES ('update'); END;
        CREATE TRIGGER log_delete AFTER DELETE ON bot_state BEGIN INSERT INTO write_log VALUES ('delete'); END;
    ";

    async fn load(provider: &SqliteStateProvider, chat: i64) -> State {
        let mut state = State::new();
        provider.load(ChatId(chat), &mut state).await.unwrap();
        state
    }

    #[tokio::test]
    async fn test_round_trip() {
        let provider = SqliteStateProvider::new(Database::open_in_memory().unwrap(), 7);
        let mut state = State::new();
        state.set("foo", "1");
        state.set("bar", "2");
        provider.update(ChatId(1), &state).await.unwrap();

        let mut loaded = load(&provider, 1).await;
        assert_eq!(loaded.map(), state.map());

        loaded.delete("bar");
        loaded.set("foo", "3");
        provider.update(ChatId(1), &loaded).await.unwrap();

        let reloaded = load(&provider, 1).await;
        assert_eq!(reloaded.map(), loaded.map());
        assert_eq!(reloaded.get("foo"), Some("3"));
    }

    #[tokio::test]
    async fn test_bots_and_conversations_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        let first = SqliteStateProvider::new(db.clone(), 1);
        let second = SqliteStateProvider::new(db, 2);

        let mut state = State::new();
        state.set("k", "v");
        first.update(ChatId(10), &state).await.unwrap();

        assert_eq!(load(&first, 10).await.get("k"), Some("v"));
        assert_eq!(load(&first, 11).await.get("k"), None);
        assert_eq!(load(&second, 10).await.get("k"), None);
    }

    #[tokio::test]
    async fn test_empty_changes_perform_no_writes() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(WRITE_LOG).unwrap();
        let provider = SqliteStateProvider::new(db.clone(), 0);

        let mut state = State::new();
        state.set("a", "1");
        provider.update(ChatId(1), &state).await.unwrap();
        assert_eq!(db.count_rows("write_log").unwrap(), 1);

        let loaded = load(&provider, 1).await;
        provider.update(ChatId(1), &loaded).await.unwrap();
        assert_eq!(db.count_rows("write_log").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deleting_every_key_round_trips() {
        let provider = SqliteStateProvider::new(Database::open_in_memory().unwrap(), 0);
        let mut state = State::new();
        state.set("lang", "en");
        provider.update(ChatId(1), &state).await.unwrap();

        let mut loaded = load(&provider, 1).await;
        loaded.delete("lang");
        provider.update(ChatId(1), &loaded).await.unwrap();

        let reloaded = load(&provider, 1).await;
        assert!(reloaded.map().is_empty());
        assert_eq!(reloaded.map(), loaded.map());
    }

    #[tokio::test]
    async fn test_first_update_writes_only_added_keys() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(WRITE_LOG).unwrap();
        let provider = SqliteStateProvider::new(db.clone(), 0);

        let mut state = State::new();
        state.fill([("a", "1"), ("b", "2")]);
        state.set("c", "3");
        provider.update(ChatId(1), &state).await.unwrap();

        assert_eq!(db.count_rows("write_log").unwrap(), 1);
        let reloaded = load(&provider, 1).await;
        assert_eq!(reloaded.get("c"), Some("3"));
        assert_eq!(reloaded.get("a"), None);
    }

    #[tokio::test]
    async fn test_update_writes_only_changed_keys() {
        let db = Database::open_in_memory().unwrap();
        let provider = SqliteStateProvider::new(db.clone(), 0);

        let mut state = State::new();
        state.set("a", "1");
        state.set("b", "2");
        provider.update(ChatId(1), &state).await.unwrap();

        db.execute_batch(WRITE_LOG).unwrap();
        let mut loaded = load(&provider, 1).await;
        loaded.set("a", "10");
        provider.update(ChatId(1), &loaded).await.unwrap();

        assert_eq!(db.count_rows("write_log").unwrap(), 1);
        assert_eq!(load(&provider, 1).await.get("b"), Some("2"));
    }
}
