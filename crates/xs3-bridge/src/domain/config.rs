//! Bridge configuration with validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Broker connection
    pub mqtt: MqttConfig,
    /// Backend login credentials
    pub credentials: Credentials,
    /// Coding station whose reader events are processed
    pub station_id: String,
    /// Reply and ACK budgets
    pub timeouts: TimeoutConfig,
    /// Read-model confirmation polling after an ACK
    pub confirm: ConfirmConfig,
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::MissingField("mqtt.host"));
        }
        if self.mqtt.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField("mqtt.client_id"));
        }
        if self.station_id.trim().is_empty() {
            return Err(ConfigError::MissingField("station_id"));
        }

        let timeouts = [
            ("login_fallback", self.timeouts.login_fallback),
            ("query", self.timeouts.query),
            ("ack_begin", self.timeouts.ack_begin),
            ("ack_end", self.timeouts.ack_end),
            ("ack_default", self.timeouts.ack_default),
            ("mss_confirm", self.timeouts.mss_confirm),
            ("revoke", self.timeouts.revoke),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::InvalidTimeout(format!("{name} cannot be 0")));
        }

        if self.confirm.tries == 0 {
            return Err(ConfigError::InvalidConfirm("tries cannot be 0".into()));
        }

        Ok(())
    }
}

/// MQTT broker connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    /// Port (default: 11883)
    pub port: u16,
    pub client_id: String,
    /// Client certificate (PEM)
    pub cert_path: Option<PathBuf>,
    /// Client private key (PEM)
    pub key_path: Option<PathBuf>,
    /// CA bundle used to verify the broker (PEM)
    pub ca_path: Option<PathBuf>,
    pub keep_alive: Duration,
    /// Fixed delay between reconnect attempts
    pub reconnect_period: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 11883,
            client_id: format!("xs3-bridge-{}", Uuid::new_v4().simple()),
            cert_path: None,
            key_path: None,
            ca_path: None,
            keep_alive: Duration::from_secs(30),
            reconnect_period: Duration::from_millis(3000),
        }
    }
}

impl MqttConfig {
    /// TLS is used when all three PEM paths are configured
    pub fn tls_paths(&self) -> Option<(&PathBuf, &PathBuf, &PathBuf)> {
        match (&self.ca_path, &self.cert_path, &self.key_path) {
            (Some(ca), Some(cert), Some(key)) => Some((ca, cert, key)),
            _ => None,
        }
    }
}

/// Backend login credentials
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Delay before the alternate login shape is tried
    pub login_fallback: Duration,
    /// Query reply budget
    pub query: Duration,
    /// ACK budget for window-begin commands
    pub ack_begin: Duration,
    /// ACK budget for window-end commands
    pub ack_end: Duration,
    /// ACK budget for every other command
    pub ack_default: Duration,
    /// Budget for smartphone update/revoke confirmations
    pub mss_confirm: Duration,
    /// Budget for the `MediumRevoked` event after a smartphone revoke
    pub revoke: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            login_fallback: Duration::from_millis(2000),
            query: Duration::from_millis(5000),
            ack_begin: Duration::from_millis(750),
            ack_end: Duration::from_millis(750),
            ack_default: Duration::from_millis(10_000),
            mss_confirm: Duration::from_millis(500),
            revoke: Duration::from_millis(5000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    pub tries: u32,
    pub interval: Duration,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            tries: 5,
            interval: Duration::from_millis(200),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid confirmation polling: {0}")]
    InvalidConfirm(String),
}
