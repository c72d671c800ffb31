//! Property-based tests for state change tracking

use super::*;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Op {
    Set(String, String),
    Delete(String),
}

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![Just("a"), Just("b"), Just("c"), Just("d")].prop_map(String::from)
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_key(), "[a-z0-9]{0,4}").prop_map(|(k, v)| Op::Set(k, v)),
        arb_key().prop_map(Op::Delete),
    ]
}

fn apply(state: &mut State, ops: &[Op]) {
    for op in ops {
        match op {
            Op::Set(k, v) => state.set(k.clone(), v.clone()),
            Op::Delete(k) => state.delete(k),
        }
    }
}

proptest! {
    #[test]
    fn prop_changes_follow_last_operation(
        initial in proptest::collection::hash_map(arb_key(), "[a-z]{1,3}", 0..4),
        ops in proptest::collection::vec(arb_op(), 0..24),
    ) {
        let mut state = State::new();
        state.fill(initial);
        apply(&mut state, &ops);

        let mut last: HashMap<&str, bool> = HashMap::new();
        for op in &ops {
            match op {
                Op::Set(k, _) => { last.insert(k, true); }
                Op::Delete(k) => { last.insert(k, false); }
            }
        }

        let changes = state.changes();
        let added: HashSet<&str> = changes.added.iter().map(String::as_str).collect();
        let removed: HashSet<&str> = changes.removed.iter().map(String::as_str).collect();
        let expect_added: HashSet<&str> = last.iter().filter(|(_, set)| **set).map(|(k, _)| *k).collect();
        let expect_removed: HashSet<&str> = last.iter().filter(|(_, set)| !**set).map(|(k, _)| *k).collect();

        prop_assert_eq!(&added, &expect_added);
        prop_assert_eq!(&removed, &expect_removed);
        prop_assert!(added.is_disjoint(&removed));
        prop_assert_eq!(added.len(), changes.added.len(), "no duplicate keys");
    }

    #[test]
    fn prop_memory_round_trip(
        ops in proptest::collection::vec(arb_op(), 0..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let provider = MemoryStateProvider::default();
            let mut state = State::new();
            provider.load(ChatId(1), &mut state).await.unwrap();
            apply(&mut state, &ops);
            provider.update(ChatId(1), &state).await.unwrap();

            let mut loaded = State::new();
            provider.load(ChatId(1), &mut loaded).await.unwrap();
            assert_eq!(loaded.map(), state.map());
        });
    }

    #[test]
    fn prop_sqlite_round_trip(
        ops in proptest::collection::vec(arb_op(), 0..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let provider = SqliteStateProvider::new(crate::db::Database::open_in_memory().unwrap(), 0);
            let mut state = State::new();
            provider.load(ChatId(1), &mut state).await.unwrap();
            apply(&mut state, &ops);
            provider.update(ChatId(1), &state).await.unwrap();

            let mut loaded = State::new();
            provider.load(ChatId(1), &mut loaded).await.unwrap();
            assert_eq!(loaded.map(), state.map());
        });
    }
}
