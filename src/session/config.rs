use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default service URL
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080";

/// Session configuration
///
/// Loads from JSON with the interval given in milliseconds:
///
/// ```json
/// {"url": "ws://events.example:8080", "reconnect_interval_ms": 2000, "max_reconnect_attempts": 10}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service URL
    pub url: String,
    /// Reconnect after unexpected closure
    pub auto_reconnect: bool,
    /// Fixed delay before each reconnect attempt
    #[serde(rename = "reconnect_interval_ms", with = "millis")]
    pub reconnect_interval: Duration,
    /// Attempt ceiling, `None` for unbounded
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            url: DEFAULT_URL.to_string(),
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: None,
        }
    }
}

impl SessionConfig {
    /// Default configuration for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        SessionConfig {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Enable or disable reconnection
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the attempt ceiling
    pub fn with_max_reconnect_attempts(mut self, max: Option<u32>) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    /// Parse from JSON text
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether another attempt is allowed after `attempts` so far
    pub(crate) fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_reconnect_attempts.map_or(true, |max| attempts < max)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, None);
        assert!(config.allows_attempt(u32::MAX - 1));
    }

    #[test]
    fn test_from_json() {
        let config = SessionConfig::from_json(
            r#"{"url":"ws://example:9000","reconnect_interval_ms":250,"max_reconnect_attempts":3}"#,
        )
        .unwrap();

        assert_eq!(config.url, "ws://example:9000");
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
        assert!(config.allows_attempt(2));
        assert!(!config.allows_attempt(3));
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::new("ws://x")
            .with_auto_reconnect(false)
            .with_reconnect_interval(Duration::from_millis(10))
            .with_max_reconnect_attempts(Some(0));

        assert_eq!(config.url, "ws://x");
        assert!(!config.auto_reconnect);
        assert!(!config.allows_attempt(0));
    }

    #[test]
    fn test_serializes_interval_in_millis() {
        let json = serde_json::to_value(SessionConfig::default()).unwrap();
        assert_eq!(json["reconnect_interval_ms"], 5000);
    }
}
