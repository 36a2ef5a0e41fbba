//! Map construction parameters
//!
//! Pure pass-through configuration for the underlying `DashMap`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Observable map configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConfig {
    /// Number of entries to pre-allocate room for
    pub initial_capacity: usize,
    /// Number of lock shards (concurrency hint); `None` lets dashmap decide
    pub shard_amount: Option<usize>,
}

impl MapConfig {
    /// Create a configuration with the given initial capacity
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            ..Default::default()
        }
    }

    /// Set the shard amount
    pub fn shard_amount(mut self, shard_amount: usize) -> Self {
        self.shard_amount = Some(shard_amount);
        self
    }

    /// Check the configuration before it reaches dashmap, which panics on a
    /// bad shard amount.
    pub fn validate(&self) -> Result<()> {
        if let Some(shards) = self.shard_amount {
            if shards <= 1 || !shards.is_power_of_two() {
                return Err(Error::Config(format!(
                    "shard amount must be a power of two greater than 1, got {}",
                    shards
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_default_config_is_valid() {
        let config = MapConfig::default();
        assert_eq!(config.initial_capacity, 0);
        assert_eq!(config.shard_amount, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shard_amount_must_be_power_of_two() {
        assert!(MapConfig::with_capacity(64).shard_amount(16).validate().is_ok());
        assert_matches!(
            MapConfig::default().shard_amount(12).validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            MapConfig::default().shard_amount(1).validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            MapConfig::default().shard_amount(0).validate(),
            Err(Error::Config(_))
        );
    }
}
