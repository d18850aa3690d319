//! # Configuration Management
//!
//! Centralized configuration for the voice session client.
//!
//! This module provides structured configuration for the client, including the
//! server endpoint, connection and handshake deadlines, the identity the client
//! announces in its version message, and logging output.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - TOML strings via `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults

use crate::error::{ProtocolError, Result};
use crate::protocol::version::SemanticVersion;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default control-channel port
pub const DEFAULT_PORT: u16 = 64738;

/// Protocol version this client announces
pub const CLIENT_VERSION: SemanticVersion = SemanticVersion::new(1, 2, 8);

/// Release string this client announces
pub const CLIENT_RELEASE: &str = concat!("voice-protocol ", env!("CARGO_PKG_VERSION"));

/// Max allowed frame payload size (8 MB)
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

/// Top-level configuration containing all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProtocolConfig {
    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("VOICE_PROTOCOL_HOST") {
            config.client.host = host;
        }

        if let Ok(port) = std::env::var("VOICE_PROTOCOL_PORT") {
            config.client.port = port.parse::<u16>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid VOICE_PROTOCOL_PORT '{port}': {e}"))
            })?;
        }

        if let Some(timeout) = env_millis("VOICE_PROTOCOL_CONNECT_TIMEOUT_MS")? {
            config.client.connect_timeout = timeout;
        }

        if let Some(timeout) = env_millis("VOICE_PROTOCOL_HANDSHAKE_TIMEOUT_MS")? {
            config.client.handshake_timeout = timeout;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Read a millisecond duration from `var`. Unset is `None`; unparseable is an error.
fn env_millis(var: &str) -> Result<Option<Duration>> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|e| ProtocolError::ConfigError(format!("Invalid {var} '{raw}': {e}")))
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Server host name or IP address
    pub host: String,

    /// Server control-channel port
    pub port: u16,

    /// Timeout for the transport connect
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Deadline for the whole handshake, from the version announce to the live signal
    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,

    /// Timeout for individual sends
    #[serde(with = "duration_serde")]
    pub operation_timeout: Duration,

    /// Release string announced in the version message
    pub release: String,

    /// Operating system name announced in the version message
    pub os: String,

    /// Operating system version announced in the version message
    pub os_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            handshake_timeout: timeout::HANDSHAKE_TIMEOUT,
            operation_timeout: timeout::DEFAULT_TIMEOUT,
            release: String::from(CLIENT_RELEASE),
            os: String::from(std::env::consts::OS),
            os_version: String::from(std::env::consts::ARCH),
        }
    }
}

impl ClientConfig {
    /// Configuration for `host` with every other field defaulted
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// `host:port` string suitable for `TcpStream::connect`
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Server host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Server port must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connect timeout too long (maximum: 300s)".to_string());
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
        } else if self.handshake_timeout.as_secs() > 600 {
            errors.push("Handshake timeout too long (maximum: 600s)".to_string());
        }

        if self.operation_timeout.as_millis() < 10 {
            errors.push("Operation timeout too short (minimum: 10ms)".to_string());
        }

        if self.release.is_empty() {
            errors.push("Release string cannot be empty".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,

    /// Whether to include the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("voice-protocol"),
            log_level: Level::INFO,
            json_format: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = level.as_str().to_ascii_lowercase();
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
