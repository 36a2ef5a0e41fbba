//! Change Events
//!
//! A change event is the immutable record of one effective transition of an
//! observable map. Each variant carries only the fields that are meaningful
//! for it, so an `Add` can never carry an old value and a `Reset` carries no
//! key at all.
//!
//! # Example
//!
//! ```
//! use concurrent_observable::domain::events::{ChangeAction, ChangeEvent};
//!
//! let event = ChangeEvent::replace("a", 2.0, 1.0);
//! assert_eq!(event.action(), ChangeAction::Replace);
//! assert_eq!(event.key(), Some(&"a"));
//! assert_eq!(event.old_value(), Some(&1.0));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of transition a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeAction {
    /// A key was inserted into an empty slot.
    Add,
    /// The value under an existing key changed.
    Replace,
    /// A key and its value were removed.
    Remove,
    /// The whole map was cleared.
    Reset,
}

impl ChangeAction {
    /// Static name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Add => "Add",
            ChangeAction::Replace => "Replace",
            ChangeAction::Remove => "Remove",
            ChangeAction::Reset => "Reset",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed transition of an observable map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ChangeEvent<K, V> {
    /// `key` did not exist and now maps to `new_value`.
    Add { key: K, new_value: V },

    /// `key` used to map to `old_value` and now maps to `new_value`.
    Replace { key: K, new_value: V, old_value: V },

    /// `key` was removed; it used to map to `old_value`.
    Remove { key: K, old_value: V },

    /// All entries were removed.
    Reset,
}

// =============================================================================
// Event Builders
// =============================================================================

impl<K, V> ChangeEvent<K, V> {
    /// Create an Add event.
    pub fn add(key: K, new_value: V) -> Self {
        ChangeEvent::Add { key, new_value }
    }

    /// Create a Replace event.
    pub fn replace(key: K, new_value: V, old_value: V) -> Self {
        ChangeEvent::Replace {
            key,
            new_value,
            old_value,
        }
    }

    /// Create a Remove event.
    pub fn remove(key: K, old_value: V) -> Self {
        ChangeEvent::Remove { key, old_value }
    }

    /// Create a Reset event.
    pub fn reset() -> Self {
        ChangeEvent::Reset
    }
}

// =============================================================================
// Accessors
// =============================================================================

impl<K, V> ChangeEvent<K, V> {
    /// Get the action of the event.
    pub fn action(&self) -> ChangeAction {
        match self {
            ChangeEvent::Add { .. } => ChangeAction::Add,
            ChangeEvent::Replace { .. } => ChangeAction::Replace,
            ChangeEvent::Remove { .. } => ChangeAction::Remove,
            ChangeEvent::Reset => ChangeAction::Reset,
        }
    }

    /// Get the affected key, `None` for `Reset`.
    pub fn key(&self) -> Option<&K> {
        match self {
            ChangeEvent::Add { key, .. } => Some(key),
            ChangeEvent::Replace { key, .. } => Some(key),
            ChangeEvent::Remove { key, .. } => Some(key),
            ChangeEvent::Reset => None,
        }
    }

    /// Get the value the key maps to after the change.
    pub fn new_value(&self) -> Option<&V> {
        match self {
            ChangeEvent::Add { new_value, .. } => Some(new_value),
            ChangeEvent::Replace { new_value, .. } => Some(new_value),
            _ => None,
        }
    }

    /// Get the value the key mapped to before the change.
    pub fn old_value(&self) -> Option<&V> {
        match self {
            ChangeEvent::Replace { old_value, .. } => Some(old_value),
            ChangeEvent::Remove { old_value, .. } => Some(old_value),
            _ => None,
        }
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, ChangeEvent::Reset)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for ChangeEvent<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEvent::Add { key, new_value } => write!(f, "Add({:?}, {:?}, -)", key, new_value),
            ChangeEvent::Replace {
                key,
                new_value,
                old_value,
            } => write!(f, "Replace({:?}, {:?}, {:?})", key, new_value, old_value),
            ChangeEvent::Remove { key, old_value } => {
                write!(f, "Remove({:?}, -, {:?})", key, old_value)
            }
            ChangeEvent::Reset => write!(f, "Reset"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ChangeEvent::add("a".to_string(), 1.5);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"action\":\"Add\""));
        assert!(json.contains("\"key\":\"a\""));
        assert!(!json.contains("old_value"));

        let deserialized: ChangeEvent<String, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_reset_serializes_without_fields() {
        let event: ChangeEvent<String, i32> = ChangeEvent::reset();
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"action":"Reset"}"#);
    }

    #[test]
    fn test_field_presence_per_action() {
        let add = ChangeEvent::add("k", 1);
        assert_eq!(add.action(), ChangeAction::Add);
        assert_eq!(add.new_value(), Some(&1));
        assert_eq!(add.old_value(), None);

        let replace = ChangeEvent::replace("k", 2, 1);
        assert_eq!(replace.new_value(), Some(&2));
        assert_eq!(replace.old_value(), Some(&1));

        let remove = ChangeEvent::remove("k", 2);
        assert_eq!(remove.key(), Some(&"k"));
        assert_eq!(remove.new_value(), None);
        assert_eq!(remove.old_value(), Some(&2));

        let reset: ChangeEvent<&str, i32> = ChangeEvent::reset();
        assert!(reset.is_reset());
        assert_eq!(reset.key(), None);
        assert_eq!(reset.new_value(), None);
        assert_eq!(reset.old_value(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChangeEvent::add("a", 1).to_string(), r#"Add("a", 1, -)"#);
        assert_eq!(
            ChangeEvent::remove("a", 2).to_string(),
            r#"Remove("a", -, 2)"#
        );
        assert_eq!(ChangeAction::Replace.to_string(), "Replace");
    }
}
