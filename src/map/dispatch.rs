//! Change Dispatch
//!
//! Owns the global listener list and fans a single change event out to the
//! listeners plus whatever per-key observers the caller hands in.
//!
//! # Design
//!
//! - Every recipient gets its own scoped thread; the mutating caller blocks
//!   until all of them have finished. There is no timeout.
//! - A lone recipient is called in-line instead of spawning.
//! - Each delivery is isolated: an error or a panic from one observer is
//!   recorded and the remaining deliveries still run.
//! - Dispatch happens after the substrate has released its shard lock, so
//!   observers may call back into the map. Nothing is locked while an
//!   observer runs.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{trace, warn};

use crate::domain::events::ChangeEvent;
use crate::domain::ports::{MapObserver, ObserverId, SharedObserver, SubscriptionId};
use crate::error::{DeliveryFailure, Recipient};

/// Global listener list and fan-out engine
pub struct Dispatcher<K, V> {
    listeners: RwLock<Vec<(SubscriptionId, SharedObserver<K, V>)>>,
    next_id: AtomicU64,
}

impl<K, V> Default for Dispatcher<K, V> {
    fn default() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<K, V> Dispatcher<K, V> {
    /// Create a dispatcher with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a global listener
    pub fn subscribe(&self, observer: SharedObserver<K, V>) -> SubscriptionId {
        let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, observer));
        trace!(subscription = %id, "Global listener subscribed");
        id
    }

    /// Remove a global listener; false if `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        let removed = listeners.len() != before;
        trace!(subscription = %id, removed, "Global listener unsubscribed");
        removed
    }

    /// Number of global listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl<K, V> Dispatcher<K, V>
where
    K: Sync,
    V: Sync,
{
    /// Deliver `event` to every global listener and to `partial`, waiting for
    /// all deliveries to finish.
    ///
    /// Returns the number of deliveries attempted and the failures among them.
    pub fn dispatch(
        &self,
        event: &ChangeEvent<K, V>,
        partial: Vec<SharedObserver<K, V>>,
    ) -> (usize, Vec<DeliveryFailure>) {
        // Snapshot so listeners can (un)subscribe from inside a callback.
        let mut recipients: Vec<(Recipient, SharedObserver<K, V>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, observer)| (Recipient::Listener(*id), observer.clone()))
            .collect();
        recipients.extend(partial.into_iter().map(|observer| {
            (Recipient::PartialObserver(ObserverId::of(&observer)), observer)
        }));

        let attempted = recipients.len();
        let failures = match recipients.as_slice() {
            [] => Vec::new(),
            [(recipient, observer)] => deliver_inline(*recipient, &**observer, event)
                .into_iter()
                .collect(),
            _ => deliver_parallel(&recipients, event),
        };

        for failure in &failures {
            warn!(
                action = %event.action(),
                recipient = %failure.recipient,
                error = %failure.message,
                "Observer failed to handle change"
            );
        }

        (attempted, failures)
    }
}

impl<K, V> fmt::Debug for Dispatcher<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listener_count", &self.len())
            .finish()
    }
}

fn deliver_inline<K, V>(
    recipient: Recipient,
    observer: &dyn MapObserver<K, V>,
    event: &ChangeEvent<K, V>,
) -> Option<DeliveryFailure> {
    match catch_unwind(AssertUnwindSafe(|| observer.on_change(event))) {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(failure(recipient, format!("{:#}", err))),
        Err(panic) => Some(failure(recipient, panic_message(&*panic))),
    }
}

fn deliver_parallel<K, V>(
    recipients: &[(Recipient, SharedObserver<K, V>)],
    event: &ChangeEvent<K, V>,
) -> Vec<DeliveryFailure>
where
    K: Sync,
    V: Sync,
{
    let joined = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = recipients
            .iter()
            .map(|(recipient, observer)| {
                let handle = scope.spawn(move |_| observer.on_change(event));
                (*recipient, handle)
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|(recipient, handle)| match handle.join() {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(failure(recipient, format!("{:#}", err))),
                Err(panic) => Some(failure(recipient, panic_message(&*panic))),
            })
            .collect::<Vec<_>>()
    });

    // Every handle is joined above, so the scope itself only fails if the
    // bookkeeping closure panicked.
    joined.unwrap_or_else(|panic| {
        recipients
            .iter()
            .map(|(recipient, _)| failure(*recipient, panic_message(&*panic)))
            .collect()
    })
}

fn failure(recipient: Recipient, message: String) -> DeliveryFailure {
    DeliveryFailure { recipient, message }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{observer_fn, TryFnObserver};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    fn counting(counter: &Arc<AtomicUsize>) -> SharedObserver<&'static str, i32> {
        let counter = counter.clone();
        observer_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let dispatcher: Dispatcher<&str, i32> = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = dispatcher.subscribe(counting(&calls));
        let second = dispatcher.subscribe(counting(&calls));
        assert_ne!(first, second);
        assert_eq!(dispatcher.len(), 2);

        dispatcher.dispatch(&ChangeEvent::add("a", 1), Vec::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(dispatcher.unsubscribe(first));
        assert!(!dispatcher.unsubscribe(first));
        dispatcher.dispatch(&ChangeEvent::add("b", 1), Vec::new());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_no_recipients() {
        let dispatcher: Dispatcher<&str, i32> = Dispatcher::new();
        let (attempted, failures) = dispatcher.dispatch(&ChangeEvent::reset(), Vec::new());
        assert_eq!(attempted, 0);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_deliveries_run_concurrently() {
        // Both observers wait on the same barrier; this only completes if
        // they run at the same time.
        let barrier = Arc::new(Barrier::new(2));
        let dispatcher: Dispatcher<&str, i32> = Dispatcher::new();
        for _ in 0..2 {
            let barrier = barrier.clone();
            dispatcher.subscribe(observer_fn(move |_: &ChangeEvent<&str, i32>| {
                barrier.wait();
            }));
        }

        let (attempted, failures) = dispatcher.dispatch(&ChangeEvent::add("a", 1), Vec::new());
        assert_eq!(attempted, 2);
        assert!(failures.is_empty());
    }

    #[test]
    fn test_failures_are_isolated_and_aggregated() {
        let dispatcher: Dispatcher<&str, i32> = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = dispatcher.subscribe(Arc::new(TryFnObserver::new(
            |_: &ChangeEvent<&str, i32>| -> anyhow::Result<()> { anyhow::bail!("listener broke") },
        )));
        dispatcher.subscribe(counting(&calls));
        let panicking: SharedObserver<&str, i32> = observer_fn(|_| panic!("observer exploded"));
        let panicking_id = ObserverId::of(&panicking);

        let (attempted, failures) =
            dispatcher.dispatch(&ChangeEvent::add("a", 1), vec![panicking, counting(&calls)]);

        assert_eq!(attempted, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(failures.len(), 2);
        assert!(failures.contains(&DeliveryFailure {
            recipient: Recipient::Listener(failing),
            message: "listener broke".to_string(),
        }));
        assert!(failures.contains(&DeliveryFailure {
            recipient: Recipient::PartialObserver(panicking_id),
            message: "panicked: observer exploded".to_string(),
        }));
    }

    #[test]
    fn test_inline_delivery_catches_panic() {
        let dispatcher: Dispatcher<&str, i32> = Dispatcher::new();
        let (_, failures) = dispatcher.dispatch(
            &ChangeEvent::remove("a", 1),
            vec![observer_fn(|_| panic!("alone"))],
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].message, "panicked: alone");
    }
}
