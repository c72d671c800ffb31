//! Deferred-commit context scopes

use super::ContextStore;
use crate::db::PersistenceResult;
use crate::event::ChatId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Intent {
    Keep,
    Set(String),
    Reset,
}

#[derive(Debug)]
struct PendingContext {
    intent: Intent,
    generation: u64,
}

type PendingMap = Arc<Mutex<HashMap<ChatId, PendingContext>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<ChatId, PendingContext>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens per-event context scopes over a [`ContextStore`]
///
/// Pending entries live in one map guarded by one lock. Entries only exist
/// between `begin` and the closer, so contention stays low.
pub struct ContextProvider {
    store: Arc<dyn ContextStore>,
    pending: PendingMap,
    generation: AtomicU64,
}

impl ContextProvider {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Load the committed value and open a scope for one event.
    ///
    /// The returned closer must be closed once the event is finished,
    /// whether or not its handlers succeeded.
    pub async fn begin(&self, chat: ChatId) -> PersistenceResult<(ContextScope, ContextCloser)> {
        let loaded = self.store.get(chat).await?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        let replaced = lock(&self.pending).insert(
            chat,
            PendingContext {
                intent: Intent::Keep,
                generation,
            },
        );
        if replaced.is_some() {
            tracing::warn!(chat_id = %chat, "Context scope opened while another scope was pending");
        }

        let scope = ContextScope {
            chat,
            generation,
            loaded,
            pending: Arc::clone(&self.pending),
        };
        let closer = ContextCloser {
            chat,
            generation,
            pending: Arc::clone(&self.pending),
            store: Arc::clone(&self.store),
            closed: false,
        };
        Ok((scope, closer))
    }

    /// Number of scopes currently open
    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Event-scoped view of one conversation's context
pub struct ContextScope {
    chat: ChatId,
    generation: u64,
    loaded: Option<String>,
    pending: PendingMap,
}

impl ContextScope {
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// Value committed when the scope was opened
    pub fn loaded(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    /// Compare against the value loaded at scope open; pending writes of the
    /// same event are never visible here.
    pub fn check(&self, value: &str) -> bool {
        self.loaded.as_deref().unwrap_or_default() == value
    }

    pub fn set(&self, value: impl Into<String>) {
        self.record(Intent::Set(value.into()));
    }

    pub fn reset(&self) {
        self.record(Intent::Reset);
    }

    fn record(&self, intent: Intent) {
        let mut pending = lock(&self.pending);
        match pending.get_mut(&self.chat) {
            Some(entry) if entry.generation == self.generation => entry.intent = intent,
            _ => {
                tracing::warn!(chat_id = %self.chat, "Context write on a closed or replaced scope ignored");
            }
        }
    }
}

/// Applies the recorded context intent exactly once
#[must_use = "a context closer must be closed to commit the event's context changes"]
pub struct ContextCloser {
    chat: ChatId,
    generation: u64,
    pending: PendingMap,
    store: Arc<dyn ContextStore>,
    closed: bool,
}

impl ContextCloser {
    fn take_intent(&self) -> Intent {
        let mut pending = lock(&self.pending);
        let current = pending
            .get(&self.chat)
            .is_some_and(|entry| entry.generation == self.generation);
        if current {
            pending
                .remove(&self.chat)
                .map_or(Intent::Keep, |entry| entry.intent)
        } else {
            Intent::Keep
        }
    }

    pub async fn close(mut self) -> PersistenceResult<()> {
        self.closed = true;
        match self.take_intent() {
            Intent::Keep => Ok(()),
            Intent::Set(value) => {
                tracing::debug!(chat_id = %self.chat, value = %value, "Commit context");
                self.store.set(self.chat, &value).await
            }
            Intent::Reset => {
                tracing::debug!(chat_id = %self.chat, "Reset context");
                self.store.reset(self.chat).await
            }
        }
    }
}

impl Drop for ContextCloser {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.take_intent() != Intent::Keep {
            tracing::warn!(chat_id = %self.chat, "Context scope dropped without closing; pending change discarded");
        }
    }
}
