//! Change classification
//!
//! Turns what the substrate reports about a single compound operation into at
//! most one change event. Outcomes are captured inside the branch of the
//! entry API that actually ran, never by re-reading the map afterwards, so a
//! concurrent writer on the same key can't be misattributed.
//!
//! | Substrate outcome                         | Event     |
//! |-------------------------------------------|-----------|
//! | insertion into empty slot                 | `Add`     |
//! | update, new value != old value            | `Replace` |
//! | update, new value == old value            | none      |
//! | removal of existing slot                  | `Remove`  |
//! | compare-and-swap success                  | `Replace` |
//! | CAS failure / absent on remove / present on add | none |
//! | full clear                                | `Reset`   |

use crate::domain::events::ChangeEvent;

/// What a single substrate primitive did to one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<V> {
    /// The key was vacant and `value` was inserted.
    Inserted { value: V },
    /// The key was occupied by `previous` and now holds `current`.
    Updated { previous: V, current: V },
    /// The key held `previous` and was removed.
    Removed { previous: V },
    /// A compare-and-swap matched `expected` and stored `current`.
    Swapped { expected: V, current: V },
    /// The primitive declined to act (CAS mismatch, key absent/present).
    Untouched,
}

impl<V> Outcome<V> {
    /// Outcome of an insert-if-absent attempt.
    pub fn from_try_add(inserted: bool, value: V) -> Self {
        if inserted {
            Outcome::Inserted { value }
        } else {
            Outcome::Untouched
        }
    }
}

/// Classify an outcome on `key` into the event it must emit, if any.
pub fn classify<K, V: PartialEq>(key: K, outcome: Outcome<V>) -> Option<ChangeEvent<K, V>> {
    match outcome {
        Outcome::Inserted { value } => Some(ChangeEvent::add(key, value)),
        Outcome::Updated { previous, current } => {
            if previous == current {
                None
            } else {
                Some(ChangeEvent::replace(key, current, previous))
            }
        }
        Outcome::Removed { previous } => Some(ChangeEvent::remove(key, previous)),
        Outcome::Swapped { expected, current } => Some(ChangeEvent::replace(key, current, expected)),
        Outcome::Untouched => None,
    }
}
