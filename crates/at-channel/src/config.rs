//! Engine configuration

use std::time::Duration;

use at_protocol::{DEFAULT_LINE_CAPACITY, SMS_UNSOLICITED};
use serde::{Deserialize, Serialize};

use crate::error::AtError;

/// Configuration for a modem instance and its channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the channel registry
    pub max_channels: usize,
    /// Size of each channel's static line buffer
    pub line_capacity: usize,
    /// Deadline for requests that do not set one (None = wait for the final response)
    pub default_timeout_ms: Option<u64>,
    /// Longest a command or PDU write may stall before the modem is considered blocked (ms)
    pub write_timeout_ms: u64,
    /// Reader loop behaviour
    pub reader: ReaderConfig,
    /// Timeout escalation
    pub health: HealthConfig,
    /// Liveness handshake
    pub handshake: HandshakeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_channels: 8,
            line_capacity: DEFAULT_LINE_CAPACITY,
            default_timeout_ms: None,
            write_timeout_ms: 1000,
            reader: ReaderConfig::default(),
            health: HealthConfig::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, AtError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default command deadline
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Bound on a single transport write
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Reader loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Consecutive zero-byte reads tolerated before backing off
    pub eof_backoff_threshold: u32,
    /// Sleep applied on each zero-byte read past the threshold (ms)
    pub eof_backoff_ms: u64,
    /// Consecutive zero-byte reads after which the reader gives up
    pub max_consecutive_eof: Option<u32>,
    /// Prefixes of unsolicited lines that are followed by a PDU line
    pub sms_unsolicited_prefixes: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            eof_backoff_threshold: 5,
            eof_backoff_ms: 1000,
            max_consecutive_eof: None,
            sms_unsolicited_prefixes: SMS_UNSOLICITED.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Timeout escalation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Escalate once consecutive timeouts exceed this count
    pub timeout_threshold: u32,
    /// Command prefixes whose timeout escalates immediately
    pub escalate_commands: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_threshold: 5,
            escalate_commands: Vec::new(),
        }
    }
}

/// Liveness handshake configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Benign command used to check the channel is alive
    pub command: String,
    /// Number of attempts
    pub retries: u32,
    /// Per-attempt deadline, also the pause after success (ms)
    pub timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            // Some stacks start with echo on and verbose off
            command: "ATE0Q0V1".to_string(),
            retries: 8,
            timeout_ms: 250,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_channels, 8);
        assert_eq!(config.line_capacity, 8 * 1024);
        assert_eq!(config.default_timeout(), None);
        assert_eq!(config.write_timeout(), Duration::from_secs(1));
        assert_eq!(config.health.timeout_threshold, 5);
        assert_eq!(config.handshake.retries, 8);
        assert!(config
            .reader
            .sms_unsolicited_prefixes
            .iter()
            .any(|p| p == "+CMT:"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "default_timeout_ms": 2000, "health": { "timeout_threshold": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.default_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.health.timeout_threshold, 3);
        assert!(config.health.escalate_commands.is_empty());
        assert_eq!(config.reader, ReaderConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json("{ \"max_channels\": \"many\" }"),
            Err(AtError::Config(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = EngineConfig::default();
        config.health.escalate_commands.push("AT+CFUN".into());
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
