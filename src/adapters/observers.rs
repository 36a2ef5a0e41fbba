//! Observer Adapters
//!
//! Ready-made implementations of the `MapObserver` port.

use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::events::{ChangeAction, ChangeEvent};
use crate::domain::ports::{MapObserver, ObserverResult, SharedObserver};

/// Logging-based observer.
///
/// Writes every change event to the tracing/logging system as JSON.
/// Useful for development, debugging, and audit trails.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver {
    /// Whether to log events at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingObserver {
    /// Create a new logging observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an observer that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create an observer that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

impl<K, V> MapObserver<K, V> for LoggingObserver
where
    K: Serialize + fmt::Debug,
    V: Serialize + fmt::Debug,
{
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult {
        let action = event.action();
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));

        if self.info_level {
            info!(action = %action, event = %json, "Map changed");
        } else {
            debug!(action = %action, event = %json, "Map changed");
        }

        Ok(())
    }
}

/// In-memory event collector.
///
/// Collects events in memory for later inspection, mostly in tests.
pub struct InMemoryEventCollector<K, V> {
    events: RwLock<Vec<ChangeEvent<K, V>>>,
}

impl<K, V> Default for InMemoryEventCollector<K, V> {
    fn default() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl<K: Clone, V: Clone> InMemoryEventCollector<K, V> {
    /// Create a new in-memory event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<ChangeEvent<K, V>> {
        self.events.read().clone()
    }

    /// Get the most recent event.
    pub fn last(&self) -> Option<ChangeEvent<K, V>> {
        self.events.read().last().cloned()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events with a specific action.
    pub fn events_of_action(&self, action: ChangeAction) -> Vec<ChangeEvent<K, V>> {
        self.events
            .read()
            .iter()
            .filter(|e| e.action() == action)
            .cloned()
            .collect()
    }
}

impl<K, V> MapObserver<K, V> for InMemoryEventCollector<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult {
        self.events.write().push(event.clone());
        Ok(())
    }
}

impl<K, V> fmt::Debug for InMemoryEventCollector<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryEventCollector")
            .field("event_count", &self.events.read().len())
            .finish()
    }
}

/// Composite observer that forwards each event to several observers in order.
pub struct CompositeObserver<K, V> {
    observers: Vec<SharedObserver<K, V>>,
}

impl<K, V> Default for CompositeObserver<K, V> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<K, V> CompositeObserver<K, V> {
    /// Create a new composite observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer to the composite.
    pub fn with_observer(mut self, observer: SharedObserver<K, V>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl<K, V> fmt::Debug for CompositeObserver<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observer_count", &self.observers.len())
            .finish()
    }
}

impl<K, V> MapObserver<K, V> for CompositeObserver<K, V> {
    fn on_change(&self, event: &ChangeEvent<K, V>) -> ObserverResult {
        for observer in &self.observers {
            observer.on_change(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_logging_observer() {
        let observer = LoggingObserver::new();
        let event = ChangeEvent::add("vol-1".to_string(), 1024u64);

        // Should not panic
        observer.on_change(&event).unwrap();
        LoggingObserver::info_level()
            .on_change(&ChangeEvent::<String, u64>::reset())
            .unwrap();
    }

    #[test]
    fn test_in_memory_collector() {
        let collector: InMemoryEventCollector<&str, i32> = InMemoryEventCollector::new();

        assert!(collector.is_empty());

        collector.on_change(&ChangeEvent::add("a", 1)).unwrap();
        collector.on_change(&ChangeEvent::add("b", 2)).unwrap();
        collector.on_change(&ChangeEvent::remove("a", 1)).unwrap();

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events_of_action(ChangeAction::Add).len(), 2);
        assert_eq!(collector.last(), Some(ChangeEvent::remove("a", 1)));

        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn test_composite_observer() {
        let first: Arc<InMemoryEventCollector<String, i32>> = Arc::new(InMemoryEventCollector::new());
        let second: Arc<InMemoryEventCollector<String, i32>> = Arc::new(InMemoryEventCollector::new());
        let composite: CompositeObserver<String, i32> = CompositeObserver::new()
            .with_observer(first.clone())
            .with_observer(second.clone())
            .with_observer(Arc::new(LoggingObserver::debug_level()));

        composite
            .on_change(&ChangeEvent::replace("k".to_string(), 2, 1))
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.events(), first.events());
    }
}
