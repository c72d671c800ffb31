//! Per-conversation serialization
//!
//! Events for the same conversation run one at a time; events for different
//! conversations never wait on each other. An entry is removed once
//! its last holder or waiter lets go, cancelled waiters included, so the map
//! does not grow with every chat ever seen.

use crate::event::ChatId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

struct Entry {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Holders plus waiters, cancelled waiters included until dropped
    users: usize,
}

type LockMap = HashMap<ChatId, Entry>;

#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other event of `chat` is in flight
    ///
    /// Cancel safe: dropping the future while it waits releases its claim
    /// on the entry.
    pub async fn acquire(&self, chat: ChatId) -> ConversationGuard {
        let (ticket, lock) = {
            let mut map = self.map();
            let entry = map.entry(chat).or_insert_with(|| Entry {
                lock: Arc::default(),
                users: 0,
            });
            entry.users += 1;
            let ticket = Ticket {
                chat,
                locks: Arc::clone(&self.inner),
            };
            (ticket, Arc::clone(&entry.lock))
        };
        let guard = lock.lock_owned().await;
        ConversationGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Conversations with a holder or waiter
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

/// One claim on a conversation entry; the last claim removes it
struct Ticket {
    chat: ChatId,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = map.get_mut(&self.chat) {
            entry.users -= 1;
            if entry.users == 0 {
                map.remove(&self.chat);
            }
        }
    }
}

/// Fields drop in order: the mutex is released before the entry can go.
pub struct ConversationGuard {
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket,
}
