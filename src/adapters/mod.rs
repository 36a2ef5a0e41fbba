//! Infrastructure Adapters
//!
//! Observer implementations for the domain `MapObserver` port.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use concurrent_observable::adapters::{InMemoryEventCollector, LoggingObserver};
//! use concurrent_observable::ObservableMap;
//!
//! let map: ObservableMap<String, u32> = ObservableMap::new();
//! let collector: Arc<InMemoryEventCollector<String, u32>> = Arc::new(InMemoryEventCollector::new());
//! map.subscribe_observer(collector.clone());
//! map.subscribe_observer(Arc::new(LoggingObserver::debug_level()));
//!
//! map.insert("a".to_string(), 1).unwrap();
//! assert_eq!(collector.len(), 1);
//! ```

mod observers;

pub use observers::{CompositeObserver, InMemoryEventCollector, LoggingObserver};
