//! Concurrent Observable Map
//!
//! A thread-safe key/value map that tells interested parties about every
//! effective change, without giving up the atomicity of its compound
//! operations (add-or-update, get-or-add, compare-and-swap update, remove).
//!
//! # Architecture
//!
//! ```text
//! mutation ──▶ DashMap (atomic per key) ──▶ classify ──▶ ChangeEvent
//!                                                          │
//!                                  ┌───────────────────────┴───────────┐
//!                                  ▼                                   ▼
//!                          global listeners                 per-key observers
//! ```
//!
//! # Guarantees
//!
//! - Exactly one event per effective change; no-op mutations emit nothing
//! - Events are classified from what the atomic primitive did, never from a
//!   second read
//! - Each event carries the old and new value of exactly one step of the
//!   key's history; events raised by one thread arrive in program order
//! - No lock is held while observers run, so deliveries from different
//!   threads may overlap and arrive in either order
//! - Deliveries of one event run in parallel; the mutating call waits for all
//!   of them and reports observer failures together
//!
//! # Example
//!
//! ```
//! use concurrent_observable::{ChangeAction, ObservableMap};
//!
//! let map: ObservableMap<String, f64> = ObservableMap::new();
//! map.subscribe(|event| println!("{}", event));
//! map.add_partial_callback(|event| assert_eq!(event.action(), ChangeAction::Add), ["a".to_string()])
//!     .unwrap();
//!
//! map.insert("a".to_string(), 1.0).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Ready-made observers (logging, in-memory collector, composite)
//! - [`domain`] - Change events and the observer port
//! - [`error`] - Error types
//! - [`map`] - The observable map, its observer registry and dispatcher

pub mod adapters;
pub mod domain;
pub mod error;
pub mod map;

// Re-export commonly used types
pub use domain::{
    observer_fn, ChangeAction, ChangeEvent, MapObserver, ObserverResult, SharedObserver,
    SubscriptionId,
};
pub use error::{DeliveryFailure, Error, Recipient, Result};
pub use map::{DispatchStats, MapConfig, ObservableMap};
