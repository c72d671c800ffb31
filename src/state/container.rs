//! Change-tracking key/value container

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Write,
    Delete,
}

/// Keys touched since the container was loaded or reset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    /// Keys whose last operation was a set
    pub added: Vec<String>,
    /// Keys whose last operation was a delete
    pub removed: Vec<String>,
}

impl StateChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Key/value data of one conversation for the duration of one event
#[derive(Debug, Clone, Default)]
pub struct State {
    data: HashMap<String, String>,
    changes: BTreeMap<String, Change>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    #[allow(dead_code)] // API completeness
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.data.insert(key.clone(), value.into());
        self.changes.insert(key, Change::Write);
    }

    pub fn delete(&mut self, key: &str) {
        self.data.remove(key);
        self.changes.insert(key.to_string(), Change::Delete);
    }

    /// Snapshot of the current data
    pub fn map(&self) -> HashMap<String, String> {
        self.data.clone()
    }

    /// Load data without recording changes
    pub fn fill<I, K, V>(&mut self, data: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.data
            .extend(data.into_iter().map(|(k, v)| (k.into(), v.into())));
    }

    pub fn changes(&self) -> StateChanges {
        let mut out = StateChanges::default();
        for (key, change) in &self.changes {
            match change {
                Change::Write => out.added.push(key.clone()),
                Change::Delete => out.removed.push(key.clone()),
            }
        }
        out
    }

    /// Drop data and change history so the container can be reused
    pub fn reset(&mut self) {
        self.data.clear();
        self.changes.clear();
    }
}
