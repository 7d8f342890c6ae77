//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::mcp::tcp::{
    ConnectionLimits, TcpConfig, DEFAULT_ADMISSION_BACKOFF, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_TIMEOUT,
};
use crate::mcp::transport::StdioConfig;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Connection limits (TCP only).
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.host must not be empty".to_string(),
            });
        }

        let limits = [
            ("limits.max_connections", self.limits.max_connections as u64),
            ("limits.read_timeout_secs", self.limits.read_timeout_secs),
            ("limits.write_timeout_secs", self.limits.write_timeout_secs),
            ("limits.admission_backoff_ms", self.limits.admission_backoff_ms),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError {
                message: format!("{name} must be greater than zero"),
            });
        }

        Ok(())
    }

    /// Settings for the stdio transport.
    #[must_use]
    pub const fn stdio_config(&self, verbose: bool) -> StdioConfig {
        StdioConfig { verbose }
    }

    /// Settings for the TCP transport.
    #[must_use]
    pub fn tcp_config(&self, verbose: bool) -> TcpConfig {
        TcpConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            verbose,
            limits: self.limits.to_connection_limits(),
        }
    }
}

/// Which transport the server runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One session over stdin/stdout.
    #[default]
    Stdio,
    /// Many sessions over a TCP listener.
    Tcp,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport to run.
    #[serde(default)]
    pub transport: TransportKind,

    /// Host to bind in TCP mode.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind in TCP mode.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

/// Connection limits as written in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Connections served at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Read deadline in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Write deadline in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Pause before retrying admission at capacity, in milliseconds.
    #[serde(default = "default_admission_backoff_ms")]
    pub admission_backoff_ms: u64,
}

impl LimitsConfig {
    /// Converts to the limits used by the TCP transport.
    #[must_use]
    pub const fn to_connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_connections: self.max_connections,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            admission_backoff: Duration::from_millis(self.admission_backoff_ms),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            admission_backoff_ms: default_admission_backoff_ms(),
        }
    }
}

const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

const fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT.as_secs()
}

const fn default_write_timeout_secs() -> u64 {
    DEFAULT_WRITE_TIMEOUT.as_secs()
}

#[allow(clippy::cast_possible_truncation)] // 100 ms fits in u64
const fn default_admission_backoff_ms() -> u64 {
    DEFAULT_ADMISSION_BACKOFF.as_millis() as u64
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
