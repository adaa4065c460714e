use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};

use crate::{Error, InternalResult};

/// Top-level system configuration (config.json).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub intel: IntelConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

/// Relay server endpoint and connection lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_url")]
    pub url: String,

    #[serde(default = "default_reconnect_interval", with = "duration_secs")]
    pub reconnect_interval: Duration,

    #[serde(default = "default_heartbeat_interval", with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Buffer size of the incoming-message broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            reconnect_interval: default_reconnect_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Settings for the chat-completion intelligence provider. Any
/// OpenAI-compatible endpoint works via `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelConfig {
    #[serde(default = "default_intel_base_url")]
    pub base_url: String,

    #[serde(default = "default_intel_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            base_url: default_intel_base_url(),
            model: default_intel_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Coordination engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_response_timeout", with = "duration_secs")]
    pub response_timeout: Duration,

    /// How much to widen the search window when no common slot exists.
    /// Applied once; the engine does not loop.
    #[serde(default = "default_search_widen_factor")]
    pub search_widen_factor: u32,

    /// Upper bound on candidate slots handed to the intelligence provider.
    #[serde(default = "default_max_slot_options")]
    pub max_slot_options: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            response_timeout: default_response_timeout(),
            search_widen_factor: default_search_widen_factor(),
            max_slot_options: default_max_slot_options(),
        }
    }
}

/// Secret settings (secret.json), kept separate from [`SystemConfig`] so the
/// main configuration can be logged or checked in.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretConfig {
    #[serde(default)]
    pub api_key: String,
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_relay_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}
fn default_reconnect_interval() -> Duration {
    Duration::from_secs(5)
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_channel_capacity() -> usize {
    100
}
fn default_intel_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_intel_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> usize {
    2000
}
fn default_response_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_search_widen_factor() -> u32 {
    2
}
fn default_max_slot_options() -> usize {
    10
}

pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.relay.url, "ws://127.0.0.1:8765");
        assert_eq!(config.coordinator.search_widen_factor, 2);
        assert_eq!(config.coordinator.response_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: SystemConfig =
            from_str(r#"{"relay": {"url": "ws://relay.example:9000"}}"#).unwrap();
        assert_eq!(config.relay.url, "ws://relay.example:9000");
        assert_eq!(config.relay.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.intel.temperature, 0.7);
    }

    #[test]
    fn test_duration_secs_roundtrip() {
        let config = RelayConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"reconnect_interval\":5"));
        let parsed: RelayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.reconnect_interval, Duration::from_secs(5));
    }
}
