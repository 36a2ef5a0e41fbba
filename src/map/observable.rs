//! Observable Map
//!
//! A drop-in concurrent map that reports every effective change.
//!
//! # Design
//!
//! - Data lives in a `DashMap`; every compound operation goes through its
//!   entry API, which holds the shard lock for the whole read-modify-write
//! - The outcome of that single locked step is classified into at most one
//!   [`ChangeEvent`]; nothing is re-read afterwards
//! - The event is dispatched after the shard lock is released, to the global
//!   listeners and to the per-key observers of the affected key
//! - `Reset` only reaches global listeners
//!
//! User closures passed to `add_or_update*` and `get_or_add*` run while the
//! shard lock is held and must not touch the same map. Observers run after
//! the lock is released and may, from any thread.
//!
//! # Ordering
//!
//! The substrate linearizes mutations of one key, and every event carries
//! the old and new value of exactly one step in that order: a `Replace`
//! names the value the previous step stored. No lock is held while
//! dispatching, so deliveries of events raised by different threads, or by
//! observers, may overlap and reach an observer out of that order. Events
//! raised by one thread arrive in the order it made them, since each call
//! waits for its own deliveries.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use super::classify::{classify, Outcome};
use super::config::MapConfig;
use super::dispatch::Dispatcher;
use super::metrics::{DispatchMetrics, DispatchStats};
use super::registry::ObserverRegistry;
use crate::domain::events::ChangeEvent;
use crate::domain::ports::{FnObserver, SharedObserver, SubscriptionId};
use crate::error::{Error, Result};

/// Concurrent key/value map with change notification.
///
/// Mutating methods return `Err(Error::ObserverFailure)` when at least one
/// observer failed; the mutation has still been applied in that case.
pub struct ObservableMap<K, V, S = RandomState> {
    /// Substrate map
    data: DashMap<K, V, S>,
    /// Per-key observers
    registry: ObserverRegistry<K, V, S>,
    /// Global listeners and fan-out
    dispatcher: Dispatcher<K, V>,
    metrics: DispatchMetrics,
}

// =============================================================================
// Construction
// =============================================================================

impl<K, V> ObservableMap<K, V, RandomState>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create an empty map
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Create an empty map with room for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self::build(
            DashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            RandomState::new(),
        )
    }

    /// Create an empty map from a validated configuration
    pub fn with_config(config: MapConfig) -> Result<Self> {
        Self::with_config_and_hasher(config, RandomState::new())
    }

    /// Create a map pre-populated with `entries`; no events are emitted for them
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        Self::from_entries_with_hasher(entries, RandomState::new())
    }
}

impl<K, V> Default for ObservableMap<K, V, RandomState>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ObservableMap<K, V, RandomState>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<K, V, S> ObservableMap<K, V, S>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + PartialEq + Send + Sync + 'static,
    S: BuildHasher + Clone,
{
    /// Create an empty map using `hasher` for both data and observer keys
    pub fn with_hasher(hasher: S) -> Self {
        Self::build(DashMap::with_hasher(hasher.clone()), hasher)
    }

    /// Create an empty map from a configuration and a hasher
    pub fn with_config_and_hasher(config: MapConfig, hasher: S) -> Result<Self> {
        config.validate()?;

        let data = match config.shard_amount {
            Some(shards) => DashMap::with_capacity_and_hasher_and_shard_amount(
                config.initial_capacity,
                hasher.clone(),
                shards,
            ),
            None => DashMap::with_capacity_and_hasher(config.initial_capacity, hasher.clone()),
        };

        Ok(Self::build(data, hasher))
    }

    /// Create a map pre-populated with `entries`, hashing keys with `hasher`.
    ///
    /// No events are emitted for the initial contents.
    pub fn from_entries_with_hasher<I>(entries: I, hasher: S) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::with_hasher(hasher);
        map.seed(entries);
        map
    }

    /// Create a map from a configuration, a hasher and initial contents.
    ///
    /// No events are emitted for the initial contents.
    pub fn with_config_and_entries<I>(config: MapConfig, hasher: S, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let map = Self::with_config_and_hasher(config, hasher)?;
        map.seed(entries);
        Ok(map)
    }

    /// Load initial contents; nobody can be subscribed yet.
    fn seed<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.data.insert(key, value);
        }
    }

    fn build(data: DashMap<K, V, S>, hasher: S) -> Self {
        Self {
            data,
            registry: ObserverRegistry::with_hasher(hasher),
            dispatcher: Dispatcher::new(),
            metrics: DispatchMetrics::new(),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Remove every entry and emit a single `Reset`.
    ///
    /// Per-key observers stay registered and do not receive the `Reset`.
    /// Deliveries already in flight on other threads are not waited for, so
    /// an event whose write preceded the clear may reach a listener after
    /// the `Reset`.
    pub fn clear(&self) -> Result<()> {
        self.data.clear();
        info!("Observable map cleared");
        self.emit(ChangeEvent::reset())
    }

    /// Insert `add_value` if `key` is absent, otherwise replace the current
    /// value with `update_fn(key, current)`.
    ///
    /// Returns the value now stored under `key`.
    pub fn add_or_update<U>(&self, key: K, add_value: V, update_fn: U) -> Result<V>
    where
        U: FnOnce(&K, &V) -> V,
    {
        self.add_or_update_with(key, move |_| add_value, update_fn)
    }

    /// Like [`add_or_update`](Self::add_or_update) with a lazily computed add value.
    pub fn add_or_update_with<A, U>(&self, key: K, add_fn: A, update_fn: U) -> Result<V>
    where
        A: FnOnce(&K) -> V,
        U: FnOnce(&K, &V) -> V,
    {
        let (stored, outcome) = match self.data.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.get().clone();
                let current = update_fn(entry.key(), &previous);
                entry.insert(current.clone());
                (current.clone(), Outcome::Updated { previous, current })
            }
            Entry::Vacant(entry) => {
                let value = add_fn(entry.key());
                entry.insert(value.clone());
                (value.clone(), Outcome::Inserted { value })
            }
        };

        self.notify(key, outcome)?;
        Ok(stored)
    }

    /// Unconditionally store `value` under `key`.
    ///
    /// Emits `Add` for a new key, `Replace` if the value changed, nothing
    /// if the same value was already stored.
    pub fn insert(&self, key: K, value: V) -> Result<V> {
        let outcome = match self.data.insert(key.clone(), value.clone()) {
            Some(previous) => Outcome::Updated {
                previous,
                current: value.clone(),
            },
            None => Outcome::Inserted {
                value: value.clone(),
            },
        };

        self.notify(key, outcome)?;
        Ok(value)
    }

    /// Return the value under `key`, inserting `value` first if absent.
    pub fn get_or_add(&self, key: K, value: V) -> Result<V> {
        self.get_or_add_with(key, move |_| value)
    }

    /// Return the value under `key`, inserting `factory(key)` first if absent.
    ///
    /// The factory runs at most once, and only when the key is absent.
    pub fn get_or_add_with<F>(&self, key: K, factory: F) -> Result<V>
    where
        F: FnOnce(&K) -> V,
    {
        self.get_or_try_add_with(key, |k| Ok::<_, anyhow::Error>(factory(k)))
    }

    /// Fallible form of [`get_or_add_with`](Self::get_or_add_with).
    ///
    /// A factory error is returned as `Error::ValueFactory`; nothing is
    /// inserted and no event is emitted.
    pub fn get_or_try_add_with<F, E>(&self, key: K, factory: F) -> Result<V>
    where
        F: FnOnce(&K) -> std::result::Result<V, E>,
        E: Into<anyhow::Error>,
    {
        let (value, inserted) = match self.data.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let value = factory(entry.key()).map_err(|e| Error::ValueFactory(e.into()))?;
                entry.insert(value.clone());
                (value, true)
            }
        };

        if inserted {
            self.notify(key, Outcome::Inserted {
                value: value.clone(),
            })?;
        }
        Ok(value)
    }

    /// Insert `value` only if `key` is absent; returns whether it was inserted.
    pub fn try_add(&self, key: K, value: V) -> Result<bool> {
        let inserted = match self.data.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value.clone());
                true
            }
        };

        self.notify(key, Outcome::from_try_add(inserted, value))?;
        Ok(inserted)
    }

    /// Remove `key`, returning the value it held.
    pub fn try_remove(&self, key: &K) -> Result<Option<V>> {
        match self.data.remove(key) {
            Some((key, previous)) => {
                self.notify(key, Outcome::Removed {
                    previous: previous.clone(),
                })?;
                Ok(Some(previous))
            }
            None => {
                self.metrics.record_suppressed();
                Ok(None)
            }
        }
    }

    /// Compare-and-swap: store `new_value` only if `key` currently holds
    /// `comparison`. Returns whether the swap happened.
    pub fn try_update(&self, key: K, new_value: V, comparison: &V) -> Result<bool> {
        let swapped = match self.data.get_mut(&key) {
            Some(mut current) if *current == *comparison => {
                *current = new_value.clone();
                true
            }
            _ => false,
        };

        let outcome = if swapped {
            Outcome::Swapped {
                expected: comparison.clone(),
                current: new_value,
            }
        } else {
            Outcome::Untouched
        };

        self.notify(key, outcome)?;
        Ok(swapped)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a copy of the value under `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.data.get(key).map(|v| v.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys present at the time of the call (weakly consistent)
    pub fn keys(&self) -> Vec<K> {
        self.data.iter().map(|e| e.key().clone()).collect()
    }

    /// Entries present at the time of the call (weakly consistent)
    pub fn snapshot(&self) -> Vec<(K, V)> {
        self.data
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Dispatch counters
    pub fn stats(&self) -> DispatchStats {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Global Listeners
    // =========================================================================

    /// Subscribe a callback to every change regardless of key
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent<K, V>) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(Arc::new(FnObserver::new(callback)))
    }

    /// Subscribe a structured listener to every change regardless of key
    pub fn subscribe_observer(&self, observer: SharedObserver<K, V>) -> SubscriptionId {
        self.dispatcher.subscribe(observer)
    }

    /// Remove a global listener; false if it was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.dispatcher.len()
    }

    // =========================================================================
    // Per-key Observers
    // =========================================================================

    /// Register `observer` for changes to any of `keys`.
    ///
    /// Returns the same handle so it can be used to unregister later.
    /// Fails with `Error::InvalidArgument` if `keys` is empty.
    pub fn add_partial_observer<I>(
        &self,
        observer: SharedObserver<K, V>,
        keys: I,
    ) -> Result<SharedObserver<K, V>>
    where
        I: IntoIterator<Item = K>,
    {
        self.registry.add(observer.clone(), keys)?;
        Ok(observer)
    }

    /// Wrap `callback` in an observer and register it for `keys`.
    pub fn add_partial_callback<F, I>(&self, callback: F, keys: I) -> Result<SharedObserver<K, V>>
    where
        F: Fn(&ChangeEvent<K, V>) + Send + Sync + 'static,
        I: IntoIterator<Item = K>,
    {
        self.add_partial_observer(Arc::new(FnObserver::new(callback)), keys)
    }

    /// Unregister `observer` from `keys`; true if it was registered for any.
    pub fn remove_partial_observer<I>(&self, observer: &SharedObserver<K, V>, keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = K>,
    {
        self.registry.remove(observer, keys)
    }

    /// Unregister `observer` from every key.
    pub fn remove_observer_everywhere(&self, observer: &SharedObserver<K, V>) -> bool {
        self.registry.remove_everywhere(observer)
    }

    /// Drop all observers of each key in `keys`.
    pub fn remove_partial_keys<I>(&self, keys: I) -> Result<bool>
    where
        I: IntoIterator<Item = K>,
    {
        self.registry.remove_keys(keys)
    }

    /// Empty the observer registry, returning what it held.
    pub fn remove_all_observers(&self) -> HashMap<K, Vec<SharedObserver<K, V>>> {
        self.registry.remove_all()
    }

    /// Observers currently registered for `key`
    pub fn observers_for(&self, key: &K) -> Vec<SharedObserver<K, V>> {
        self.registry.observers_for(key)
    }

    /// Keys that currently have at least one observer
    pub fn observed_keys(&self) -> Vec<K> {
        self.registry.observed_keys()
    }

    // =========================================================================
    // Notification
    // =========================================================================

    fn notify(&self, key: K, outcome: Outcome<V>) -> Result<()> {
        match classify(key, outcome) {
            Some(event) => self.emit(event),
            None => {
                self.metrics.record_suppressed();
                Ok(())
            }
        }
    }

    fn emit(&self, event: ChangeEvent<K, V>) -> Result<()> {
        let action = event.action();
        self.metrics.record_event(action);

        let partial = match event.key() {
            Some(key) => self.registry.observers_for(key),
            None => Vec::new(),
        };
        debug!(
            %action,
            listeners = self.dispatcher.len(),
            partial_observers = partial.len(),
            "Dispatching change"
        );

        let (attempted, failures) = self.dispatcher.dispatch(&event, partial);
        self.metrics.record_deliveries(attempted, failures.len());

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::ObserverFailure { action, failures })
        }
    }
}

impl<K, V, S> fmt::Debug for ObservableMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("len", &self.data.len())
            .field("listeners", &self.dispatcher)
            .field("registry", &self.registry)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
