//! Registry configuration types
//!
//! The registry itself needs no configuration to work. These settings only
//! shape how it allocates, what it counts, and how it names itself in logs,
//! which matters once many registries are embedded in one application.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Callbacks`](crate::Callbacks) registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbacksConfig {
    /// Label used in every log record emitted by the registry
    #[serde(default = "default_name")]
    pub name: String,

    /// Subscription slots to reserve up front
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Whether to maintain delivery counters (see [`RegistryStats`](crate::RegistryStats))
    #[serde(default = "default_true")]
    pub track_stats: bool,
}

fn default_name() -> String {
    "callbacks".to_string()
}

fn default_initial_capacity() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for CallbacksConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            initial_capacity: default_initial_capacity(),
            track_stats: true,
        }
    }
}

impl CallbacksConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the log label
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method: set the number of pre-allocated subscription slots
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Builder method: enable or disable delivery counters
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CallbacksConfig::new()
            .with_name("cart-total")
            .with_initial_capacity(16)
            .with_stats(false);

        assert_eq!(config.name, "cart-total");
        assert_eq!(config.initial_capacity, 16);
        assert!(!config.track_stats);
    }

    #[test]
    fn test_serde_defaults() {
        let config: CallbacksConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CallbacksConfig::default());

        let config: CallbacksConfig = serde_json::from_str(r#"{"name": "selection"}"#).unwrap();
        assert_eq!(config.name, "selection");
        assert_eq!(config.initial_capacity, 4);
        assert!(config.track_stats);
    }
}
