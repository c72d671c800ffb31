//! Per-conversation dialog-position context
//!
//! The context is a single optional token per conversation. Handlers never
//! write it directly: [`ContextProvider::begin`] opens a scope whose writes
//! are buffered and applied once by the matching [`ContextCloser`].

mod locks;
mod memory;
mod scope;
mod sqlite;

pub use locks::{ConversationGuard, ConversationLocks};
pub use memory::MemoryContextStore;
pub use scope::{ContextCloser, ContextProvider, ContextScope};
pub use sqlite::SqliteContextStore;

use crate::db::PersistenceResult;
use crate::event::ChatId;
use async_trait::async_trait;

/// Backend holding the committed context value of each conversation
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn get(&self, chat: ChatId) -> PersistenceResult<Option<String>>;

    async fn set(&self, chat: ChatId, value: &str) -> PersistenceResult<()>;

    async fn reset(&self, chat: ChatId) -> PersistenceResult<()>;
}
