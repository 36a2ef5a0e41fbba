//! Observable Concurrent Map
//!
//! Change notification layered over a `DashMap`.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ ObservableMap ──▶ DashMap entry API (atomic per key)
//!                 │
//!                 ├─ classify(outcome) ──▶ ChangeEvent (or nothing)
//!                 │
//!                 └─ Dispatcher ──┬──▶ global listeners
//!                                 └──▶ ObserverRegistry[key]
//! ```
//!
//! Deliveries for one event run in parallel and the caller waits for all of
//! them before the mutating call returns.

mod classify;
mod config;
mod dispatch;
mod metrics;
mod observable;
mod proptest;
mod registry;

pub use classify::{classify, Outcome};
pub use config::MapConfig;
pub use dispatch::Dispatcher;
pub use metrics::{DispatchMetrics, DispatchStats};
pub use observable::ObservableMap;
pub use registry::{ObserverRegistry, ObserverSet};
