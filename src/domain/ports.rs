//! Observer Port
//!
//! The single capability an observable map needs from the outside world:
//! something that can receive a [`ChangeEvent`]. Structured listeners
//! implement [`MapObserver`] directly; plain closures are wrapped by
//! [`FnObserver`] or [`TryFnObserver`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::events::ChangeEvent;

/// Outcome of delivering one event to one observer.
pub type ObserverResult = anyhow::Result<()>;

/// Receives change events from an observable map.
///
/// Observers may be invoked from several threads at once, including for the
/// same event, and may call back into the map that notified them.
pub trait MapObserver<K, V>: Send + Sync {
    /// Handle one change. An error is reported back to the mutating caller
    /// without stopping delivery to the other observers.
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult;
}

impl<K, V> fmt::Debug for dyn MapObserver<K, V> + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapObserver").finish_non_exhaustive()
    }
}

/// Shared handle to an observer; identity is the allocation it points to.
pub type SharedObserver<K, V> = Arc<dyn MapObserver<K, V>>;

/// Identity of a registered observer, derived from its `Arc` allocation.
///
/// Stable for as long as at least one handle to the observer is alive, which
/// the registry guarantees while the observer is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(usize);

impl ObserverId {
    pub fn of<K, V>(observer: &SharedObserver<K, V>) -> Self {
        Self(Arc::as_ptr(observer) as *const () as usize)
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Handle returned by global subscriptions, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Function Adapters
// =============================================================================

/// Adapts an infallible callback into a [`MapObserver`].
pub struct FnObserver<F> {
    callback: F,
}

impl<F> FnObserver<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<K, V, F> MapObserver<K, V> for FnObserver<F>
where
    F: Fn(&ChangeEvent<K, V>) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult {
        (self.callback)(event);
        Ok(())
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}

/// Adapts a fallible callback into a [`MapObserver`].
pub struct TryFnObserver<F> {
    callback: F,
}

impl<F> TryFnObserver<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<K, V, F> MapObserver<K, V> for TryFnObserver<F>
where
    F: Fn(&ChangeEvent<K, V>) -> ObserverResult + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult {
        (self.callback)(event)
    }
}

impl<F> fmt::Debug for TryFnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryFnObserver").finish_non_exhaustive()
    }
}

/// Wrap a plain callback into a shareable observer handle.
pub fn observer_fn<K, V, F>(callback: F) -> SharedObserver<K, V>
where
    K: 'static,
    V: 'static,
    F: Fn(&ChangeEvent<K, V>) + Send + Sync + 'static,
{
    Arc::new(FnObserver::new(callback))
}

// =============================================================================
// Tests
// =============================================================================
