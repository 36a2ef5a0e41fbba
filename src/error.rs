//! Error types for the observable map

use std::fmt;

use thiserror::Error;

use crate::domain::events::ChangeAction;
use crate::domain::ports::{ObserverId, SubscriptionId};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mutating or observing an observable map
#[derive(Error, Debug)]
pub enum Error {
    /// A registry operation was called with an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more observers failed while a change was being delivered.
    ///
    /// The mutation itself has already been applied when this is returned.
    #[error("{} observer(s) failed handling {action} event: {}", failures.len(), summarize(failures))]
    ObserverFailure {
        action: ChangeAction,
        failures: Vec<DeliveryFailure>,
    },

    /// A user-supplied value factory failed; nothing was inserted
    #[error("Value factory failed: {0}")]
    ValueFactory(#[source] anyhow::Error),
}

impl Error {
    /// Delivery failures carried by an `ObserverFailure`, empty otherwise.
    pub fn delivery_failures(&self) -> &[DeliveryFailure] {
        match self {
            Error::ObserverFailure { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Who a failed delivery was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// A global listener registered through `subscribe`
    Listener(SubscriptionId),
    /// A per-key observer from the registry, by identity
    PartialObserver(ObserverId),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Listener(id) => write!(f, "listener {}", id),
            Recipient::PartialObserver(id) => write!(f, "partial observer {}", id),
        }
    }
}

/// A single failed delivery of a change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub recipient: Recipient,
    pub message: String,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.recipient, self.message)
    }
}

fn summarize(failures: &[DeliveryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
