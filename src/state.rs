//! Per-conversation key/value state
//!
//! A [`State`] lives for one event: loaded from a [`StateProvider`] when the
//! event scope opens, mutated by handlers, and written back once when the
//! scope closes. Providers persist only what changed since the load.

mod container;
mod memory;
pub mod ops;
mod sqlite;

#[cfg(test)]
mod proptests;

pub use container::{State, StateChanges};
pub use memory::MemoryStateProvider;
pub use ops::{ArithmeticError, StateOp, StateOpError};
pub use sqlite::SqliteStateProvider;

use crate::db::PersistenceResult;
use crate::event::ChatId;
use async_trait::async_trait;
use std::sync::Arc;

/// Load/persist backend for conversation state
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Fill `state` with the best-known snapshot for the conversation
    async fn load(&self, chat: ChatId, state: &mut State) -> PersistenceResult<()>;

    /// Persist exactly the keys reported by `state.changes()`
    async fn update(&self, chat: ChatId, state: &State) -> PersistenceResult<()>;
}

#[async_trait]
impl<T: StateProvider + ?Sized> StateProvider for Arc<T> {
    async fn load(&self, chat: ChatId, state: &mut State) -> PersistenceResult<()> {
        (**self).load(chat, state).await
    }

    async fn update(&self, chat: ChatId, state: &State) -> PersistenceResult<()> {
        (**self).update(chat, state).await
    }
}
