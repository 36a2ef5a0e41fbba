//! Domain Layer
//!
//! - **Events** (`events.rs`) - the change event model
//! - **Ports** (`ports.rs`) - the observer abstraction and its function adapters

pub mod events;
pub mod ports;

pub use events::{ChangeAction, ChangeEvent};
pub use ports::{
    observer_fn, FnObserver, MapObserver, ObserverId, ObserverResult, SharedObserver,
    SubscriptionId, TryFnObserver,
};
