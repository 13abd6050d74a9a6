//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the capture engine.
///
/// Every field has a default, so a host can embed this in its own settings
/// file and only override what it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between polling-loop ticks.
    pub poll_interval_ms: u64,
    /// Buffered-event capacity requested for each polled device.
    pub buffer_size: u32,
    /// Bit in a buffered datum that means "pressed".
    pub press_mask: u8,
    /// Name of the background thread.
    pub thread_name: String,
    /// Elevate the background thread once initialization completes.
    pub raise_priority: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            buffer_size: 512,
            press_mask: 0x80,
            thread_name: "shortcut-capture".to_string(),
            raise_priority: true,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(20));
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.press_mask, 0x80);
        assert!(config.raise_priority);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"poll_interval_ms": 50, "raise_priority": false}"#).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert!(!config.raise_priority);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.thread_name, "shortcut-capture");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }
}
