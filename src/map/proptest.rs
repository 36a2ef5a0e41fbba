//! Property-Based Tests for the Observable Map
//!
//! Drives random single-threaded operation sequences against both the map
//! and a plain `HashMap` model, and checks that the emitted event stream is
//! exactly what the model predicts.
//!
//! # Test Properties
//!
//! 1. **Event Fidelity**: every effective change emits one correctly
//!    classified event, no-ops emit nothing
//! 2. **Key Scoping**: a per-key observer sees exactly the global stream
//!    filtered to its keys, minus `Reset`
//! 3. **Final State**: the map's contents match the model

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use super::observable::ObservableMap;
use crate::adapters::InMemoryEventCollector;
use crate::domain::ChangeEvent;

// =============================================================================
// Property Strategies
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, i32),
    AddOrUpdate(u8, i32, i32),
    GetOrAdd(u8, i32),
    TryAdd(u8, i32),
    TryRemove(u8),
    TryUpdate(u8, i32, i32),
    Clear,
}

/// Small key and value ranges so that collisions and no-ops are common.
fn op_strategy() -> impl Strategy<Value = Op> {
    let key = 0u8..4;
    let value = 0i32..4;
    prop_oneof![
        4 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::Insert(k, v)),
        4 => (key.clone(), value.clone(), 0i32..2).prop_map(|(k, v, d)| Op::AddOrUpdate(k, v, d)),
        2 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::GetOrAdd(k, v)),
        3 => (key.clone(), value.clone()).prop_map(|(k, v)| Op::TryAdd(k, v)),
        3 => key.clone().prop_map(Op::TryRemove),
        4 => (key, value.clone(), value).prop_map(|(k, n, c)| Op::TryUpdate(k, n, c)),
        1 => Just(Op::Clear),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..200)
}

// =============================================================================
// Model
// =============================================================================

/// Apply `op` to the model and return the event the map should emit.
fn apply_to_model(model: &mut HashMap<u8, i32>, op: &Op) -> Option<ChangeEvent<u8, i32>> {
    match *op {
        Op::Insert(k, v) => match model.insert(k, v) {
            None => Some(ChangeEvent::add(k, v)),
            Some(old) if old != v => Some(ChangeEvent::replace(k, v, old)),
            Some(_) => None,
        },
        Op::AddOrUpdate(k, v, delta) => match model.get(&k).copied() {
            None => {
                model.insert(k, v);
                Some(ChangeEvent::add(k, v))
            }
            Some(old) => {
                model.insert(k, old + delta);
                (delta != 0).then(|| ChangeEvent::replace(k, old + delta, old))
            }
        },
        Op::GetOrAdd(k, v) | Op::TryAdd(k, v) => {
            if model.contains_key(&k) {
                None
            } else {
                model.insert(k, v);
                Some(ChangeEvent::add(k, v))
            }
        }
        Op::TryRemove(k) => model.remove(&k).map(|old| ChangeEvent::remove(k, old)),
        Op::TryUpdate(k, new, cmp) => match model.get(&k).copied() {
            Some(old) if old == cmp => {
                model.insert(k, new);
                Some(ChangeEvent::replace(k, new, old))
            }
            _ => None,
        },
        Op::Clear => {
            model.clear();
            Some(ChangeEvent::reset())
        }
    }
}

fn apply_to_map(map: &ObservableMap<u8, i32>, op: &Op) -> crate::Result<()> {
    match *op {
        Op::Insert(k, v) => map.insert(k, v).map(drop),
        Op::AddOrUpdate(k, v, delta) => map.add_or_update(k, v, |_, old| old + delta).map(drop),
        Op::GetOrAdd(k, v) => map.get_or_add(k, v).map(drop),
        Op::TryAdd(k, v) => map.try_add(k, v).map(drop),
        Op::TryRemove(k) => map.try_remove(&k).map(drop),
        Op::TryUpdate(k, new, cmp) => map.try_update(k, new, &cmp).map(drop),
        Op::Clear => map.clear(),
    }
}

// =============================================================================
// Event Stream Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the global stream is exactly the model's predicted stream.
    #[test]
    fn prop_events_match_sequential_model(ops in ops_strategy()) {
        let map: ObservableMap<u8, i32> = ObservableMap::new();
        let global: Arc<InMemoryEventCollector<u8, i32>> = Arc::new(InMemoryEventCollector::new());
        map.subscribe_observer(global.clone());

        let mut model = HashMap::new();
        let mut expected = Vec::new();

        for op in &ops {
            apply_to_map(&map, op)?;
            expected.extend(apply_to_model(&mut model, op));
        }

        prop_assert_eq!(global.events(), expected);

        let mut contents = map.snapshot();
        contents.sort();
        let mut model_contents: Vec<_> = model.into_iter().collect();
        model_contents.sort();
        prop_assert_eq!(contents, model_contents);
    }

    /// Property: a per-key observer sees the global stream filtered to its key.
    #[test]
    fn prop_partial_observer_sees_filtered_stream(
        ops in ops_strategy(),
        watched in 0u8..4,
    ) {
        let map: ObservableMap<u8, i32> = ObservableMap::new();
        let global: Arc<InMemoryEventCollector<u8, i32>> = Arc::new(InMemoryEventCollector::new());
        let partial: Arc<InMemoryEventCollector<u8, i32>> = Arc::new(InMemoryEventCollector::new());
        map.subscribe_observer(global.clone());
        map.add_partial_observer(partial.clone(), [watched])?;

        for op in &ops {
            apply_to_map(&map, op)?;
        }

        let filtered: Vec<_> = global
            .events()
            .into_iter()
            .filter(|e| e.key() == Some(&watched))
            .collect();
        prop_assert_eq!(partial.events(), filtered);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: stats count what the listener received, and every mutation
    /// is either an event or a suppressed no-op.
    #[test]
    fn prop_stats_agree_with_stream(ops in ops_strategy()) {
        let map: ObservableMap<u8, i32> = ObservableMap::new();
        let global: Arc<InMemoryEventCollector<u8, i32>> = Arc::new(InMemoryEventCollector::new());
        map.subscribe_observer(global.clone());

        for op in &ops {
            apply_to_map(&map, op)?;
        }

        let stats = map.stats();
        prop_assert_eq!(stats.events() as usize, global.len());
        prop_assert_eq!(stats.deliveries as usize, global.len());
        prop_assert_eq!(
            stats.events() + stats.suppressed,
            ops.len() as u64 - get_or_add_hits(&ops)
        );
    }
}

/// `get_or_add` on a present key is a read, not a suppressed mutation.
fn get_or_add_hits(ops: &[Op]) -> u64 {
    let mut model = HashMap::new();
    let mut hits = 0;
    for op in ops {
        if let Op::GetOrAdd(k, _) = op {
            if model.contains_key(k) {
                hits += 1;
            }
        }
        apply_to_model(&mut model, op);
    }
    hits
}
