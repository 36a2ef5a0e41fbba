//! Per-key Observer Registry
//!
//! Associates observers with the keys they care about. The registry is a
//! separate `DashMap` from the data map, so registering or removing
//! observers never contends with data mutations, and a key can be observed
//! before it exists or after it has been removed.
//!
//! # Design
//!
//! - Each key maps to an [`ObserverSet`] with set semantics by observer identity
//! - Dispatch reads a cloned snapshot of the set under the shard read lock
//! - A `parking_lot::RwLock` gate lets `remove_all` run atomically with
//!   respect to every other registry edit

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, trace};

use crate::domain::ports::{ObserverId, SharedObserver};
use crate::error::{Error, Result};

/// Observers registered for a single key, in registration order
pub struct ObserverSet<K, V> {
    members: Vec<(ObserverId, SharedObserver<K, V>)>,
}

impl<K, V> Default for ObserverSet<K, V> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
        }
    }
}

impl<K, V> ObserverSet<K, V> {
    /// Insert unless already present; returns whether it was inserted
    fn insert(&mut self, observer: SharedObserver<K, V>) -> bool {
        let id = ObserverId::of(&observer);
        if self.contains(id) {
            return false;
        }
        self.members.push((id, observer));
        true
    }

    fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.members.len();
        self.members.retain(|(member, _)| *member != id);
        self.members.len() != before
    }

    fn contains(&self, id: ObserverId) -> bool {
        self.members.iter().any(|(member, _)| *member == id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn snapshot(&self) -> Vec<SharedObserver<K, V>> {
        self.members.iter().map(|(_, o)| o.clone()).collect()
    }

    fn into_observers(self) -> Vec<SharedObserver<K, V>> {
        self.members.into_iter().map(|(_, o)| o).collect()
    }
}

/// Concurrent mapping from key to the observers registered for it
pub struct ObserverRegistry<K, V, S = RandomState> {
    /// key -> observers
    entries: DashMap<K, ObserverSet<K, V>, S>,
    /// Shared by single-key edits, exclusive for `remove_all`
    gate: RwLock<()>,
}

impl<K, V> Default for ObserverRegistry<K, V, RandomState>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ObserverRegistry<K, V, RandomState>
where
    K: Eq + Hash,
{
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }
}

impl<K, V, S> ObserverRegistry<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    /// Create an empty registry hashing keys with `hasher`
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            entries: DashMap::with_hasher(hasher),
            gate: RwLock::new(()),
        }
    }

    /// Register `observer` for every key in `keys`.
    ///
    /// Returns how many keys gained the observer; keys that already had it
    /// are left unchanged.
    pub fn add<I>(&self, observer: SharedObserver<K, V>, keys: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
    {
        let keys = collect_keys(keys)?;
        let _gate = self.gate.read();

        let mut added = 0;
        for key in keys {
            if self.entries.entry(key).or_default().insert(observer.clone()) {
                added += 1;
            }
        }

        trace!(added, "Registered partial observer");
        Ok(added)
    }

    /// Unregister `observer` from each key in `keys`.
    ///
    /// Returns true if it was removed from at least one of them.
    pub fn remove<I>(&self, observer: &SharedObserver<K, V>, keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = K>,
    {
        let keys = collect_keys(keys)?;
        let id = ObserverId::of(observer);
        let _gate = self.gate.read();

        let mut removed = false;
        for key in keys {
            removed |= self.remove_from_key(&key, id);
        }

        trace!(removed, "Unregistered partial observer from keys");
        Ok(removed)
    }

    /// Unregister `observer` from every key it is registered for.
    pub fn remove_everywhere(&self, observer: &SharedObserver<K, V>) -> bool
    where
        K: Clone,
    {
        let id = ObserverId::of(observer);
        let _gate = self.gate.read();

        let mut removed = false;
        for key in self.keys_unguarded() {
            removed |= self.remove_from_key(&key, id);
        }

        trace!(removed, "Unregistered partial observer everywhere");
        removed
    }

    /// Drop every observer registered for each key in `keys`.
    ///
    /// Returns true if at least one key had observers.
    pub fn remove_keys<I>(&self, keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = K>,
    {
        let keys = collect_keys(keys)?;
        let _gate = self.gate.read();

        let mut removed = false;
        for key in keys {
            removed |= self.entries.remove(&key).is_some();
        }

        trace!(removed, "Dropped observer sets for keys");
        Ok(removed)
    }

    /// Empty the whole registry, returning what was registered.
    pub fn remove_all(&self) -> HashMap<K, Vec<SharedObserver<K, V>>>
    where
        K: Clone,
    {
        let _gate = self.gate.write();

        let removed: HashMap<_, _> = self
            .keys_unguarded()
            .into_iter()
            .filter_map(|key| self.entries.remove(&key))
            .map(|(key, set)| (key, set.into_observers()))
            .collect();

        info!(keys = removed.len(), "Removed all partial observers");
        removed
    }

    /// Snapshot of the observers registered for `key`
    pub fn observers_for(&self, key: &K) -> Vec<SharedObserver<K, V>> {
        self.entries
            .get(key)
            .map(|set| set.snapshot())
            .unwrap_or_default()
    }

    /// Check whether `observer` is registered for `key`
    pub fn is_registered(&self, observer: &SharedObserver<K, V>, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|set| set.contains(ObserverId::of(observer)))
            .unwrap_or(false)
    }

    /// Keys that currently have at least one observer
    pub fn observed_keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.keys_unguarded()
    }

    /// Number of keys with at least one observer
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn keys_unguarded(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove one observer from one key, pruning the set once it is empty.
    fn remove_from_key(&self, key: &K, id: ObserverId) -> bool {
        let removed = match self.entries.get_mut(key) {
            Some(mut set) => set.remove(id),
            None => return false,
        };
        // Adders hold the shard write lock while inserting, so the emptiness
        // check and the removal can't race with a new registration.
        self.entries.remove_if(key, |_, set| set.is_empty());
        removed
    }
}

impl<K, V, S> fmt::Debug for ObserverRegistry<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observed_keys", &self.entries.len())
            .finish()
    }
}

fn collect_keys<K, I>(keys: I) -> Result<Vec<K>>
where
    I: IntoIterator<Item = K>,
{
    let keys: Vec<K> = keys.into_iter().collect();
    if keys.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one key is required".to_string(),
        ));
    }
    Ok(keys)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::observer_fn;
    use assert_matches::assert_matches;

    fn noop() -> SharedObserver<String, i32> {
        observer_fn(|_| {})
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_add_is_idempotent_per_key() {
        let registry = ObserverRegistry::new();
        let obs = noop();

        assert_eq!(registry.add(obs.clone(), [key("a"), key("b")]).unwrap(), 2);
        assert_eq!(registry.add(obs.clone(), [key("a")]).unwrap(), 0);

        assert_eq!(registry.observers_for(&key("a")).len(), 1);
        assert!(registry.is_registered(&obs, &key("b")));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_distinct_observers_share_a_key() {
        let registry = ObserverRegistry::new();
        let first = noop();
        let second = noop();

        registry.add(first.clone(), [key("a")]).unwrap();
        registry.add(second.clone(), [key("a")]).unwrap();

        assert_eq!(registry.observers_for(&key("a")).len(), 2);
    }

    #[test]
    fn test_empty_key_list_is_rejected() {
        let registry: ObserverRegistry<String, i32> = ObserverRegistry::new();
        let obs = noop();

        assert_matches!(
            registry.add(obs.clone(), Vec::<String>::new()),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            registry.remove(&obs, Vec::<String>::new()),
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            registry.remove_keys(Vec::<String>::new()),
            Err(Error::InvalidArgument(_))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_from_keys_prunes_empty_sets() {
        let registry = ObserverRegistry::new();
        let obs = noop();
        registry.add(obs.clone(), [key("a"), key("b")]).unwrap();

        assert!(registry.remove(&obs, [key("a")]).unwrap());
        assert!(!registry.remove(&obs, [key("a")]).unwrap());
        assert!(registry.observers_for(&key("a")).is_empty());
        assert_eq!(registry.observed_keys(), vec![key("b")]);
    }

    #[test]
    fn test_remove_everywhere() {
        let registry = ObserverRegistry::new();
        let obs = noop();
        let other = noop();
        registry.add(obs.clone(), [key("a"), key("b"), key("c")]).unwrap();
        registry.add(other.clone(), [key("c")]).unwrap();

        assert!(registry.remove_everywhere(&obs));
        assert!(!registry.remove_everywhere(&obs));
        assert_eq!(registry.observed_keys(), vec![key("c")]);
        assert!(registry.is_registered(&other, &key("c")));
    }

    #[test]
    fn test_remove_keys_drops_every_observer() {
        let registry = ObserverRegistry::new();
        registry.add(noop(), [key("a")]).unwrap();
        registry.add(noop(), [key("a")]).unwrap();

        assert!(registry.remove_keys([key("a"), key("missing")]).unwrap());
        assert!(!registry.remove_keys([key("a")]).unwrap());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_all_returns_snapshot() {
        let registry = ObserverRegistry::new();
        let obs = noop();
        let other = noop();
        registry.add(obs.clone(), [key("a"), key("b")]).unwrap();
        registry.add(other.clone(), [key("b")]).unwrap();

        let removed = registry.remove_all();

        assert_eq!(removed.len(), 2);
        assert_eq!(removed[&key("a")].len(), 1);
        assert_eq!(removed[&key("b")].len(), 2);
        assert_eq!(
            ObserverId::of(&removed[&key("a")][0]),
            ObserverId::of(&obs)
        );
        assert!(registry.is_empty());
        assert!(registry.remove_all().is_empty());
    }
}
