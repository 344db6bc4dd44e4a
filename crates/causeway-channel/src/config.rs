//! Channel configuration.

use std::time::Duration;

use causeway_bloom::BloomFilterOptions;

use crate::repair::RepairConfig;

/// Configuration for channel behavior.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How many local-history entries each outgoing message carries as
    /// causal history.
    pub causal_history_size: usize,
    /// How many distinct peer bloom filters must report an in-flight
    /// message before it counts as acknowledged. Conservative by default to
    /// tolerate bloom false positives.
    pub acknowledgement_count: u32,
    /// Whether buffered messages with unmet dependencies are eventually
    /// declared lost.
    pub received_message_timeout_enabled: bool,
    /// Retention window for buffered messages when the timeout is enabled.
    pub received_message_timeout: Duration,
    /// Sizing of the acknowledgement digest. Must match across the
    /// channel's participants.
    pub bloom: BloomFilterOptions,
    /// Enables the repair layer when set.
    pub repair: Option<RepairConfig>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            causal_history_size: 2,
            acknowledgement_count: 2,
            received_message_timeout_enabled: false,
            received_message_timeout: Duration::from_secs(5 * 60),
            bloom: BloomFilterOptions::default(),
            repair: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.causal_history_size, 2);
        assert_eq!(config.acknowledgement_count, 2);
        assert!(!config.received_message_timeout_enabled);
        assert_eq!(config.received_message_timeout, Duration::from_secs(300));
        assert!(config.repair.is_none());
    }
}
