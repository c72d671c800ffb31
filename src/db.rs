//! Relational persistence for conversation state and context
//!
//! A single SQLite connection shared behind a mutex. Every public operation
//! of the relational backends runs inside its own transaction.

mod schema;

pub use schema::SCHEMA;

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> PersistenceResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> PersistenceResult<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` in a transaction, committing on success and rolling back on
    /// failure.
    pub fn transactional<T>(
        &self,
        op: impl FnOnce(&Transaction<'_>) -> PersistenceResult<T>,
    ) -> PersistenceResult<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        match op(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    tracing::warn!(error = %rollback, "Failed to roll back transaction");
                }
                Err(e)
            }
        }
    }

    /// Run raw SQL outside of a transaction (tests and maintenance)
    #[allow(dead_code)] // Used in tests
    pub fn execute_batch(&self, sql: &str) -> PersistenceResult<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    /// Count rows of a table (tests and diagnostics)
    #[allow(dead_code)] // Used in tests
    pub fn count_rows(&self, table: &str) -> PersistenceResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(self.conn().query_row(&sql, [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_schema_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
        assert_eq!(db.count_rows("bot_state").unwrap(), 0);
        assert_eq!(db.count_rows("bot_context").unwrap(), 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: PersistenceResult<()> = db.transactional(|tx| {
            tx.execute(
                "INSERT INTO bot_context (bot_id, chat_id, value) VALUES (?1, ?2, ?3)",
                params![0, 1, "menu"],
            )?;
            Err(PersistenceError::Backend("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(db.count_rows("bot_context").unwrap(), 0);
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        db.transactional(|tx| {
            tx.execute(
                "INSERT INTO bot_context (bot_id, chat_id, value) VALUES (?1, ?2, ?3)",
                params![0, 1, "menu"],
            )?;
            Ok(())
        })
        .unwrap();
        assert_eq!(db.count_rows("bot_context").unwrap(), 1);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot.db");
        {
            let db = Database::open(&path).unwrap();
            db.execute_batch("INSERT INTO bot_context (bot_id, chat_id, value) VALUES (0, 1, 'x')")
                .unwrap();
        }
        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.count_rows("bot_context").unwrap(), 1);
    }
}
