//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! 1. Path given as the positional CLI argument; it must exist
//! 2. Default location, used only if present:
//!    - **Linux/macOS:** `~/.mcp-framed-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-framed-server\config.json`
//!
//! With no file at all the built-in defaults apply: stdio transport, and
//! `127.0.0.1:8080` with 100 connections when TCP is selected.

mod settings;

pub use settings::{Config, LimitsConfig, LoggingConfig, ServerConfig, TransportKind};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-framed-server/`
/// - **Windows:** `%USERPROFILE%\.mcp-framed-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-framed-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and validates the configuration.
///
/// If `path` is `None`, the default location is tried and a missing file
/// yields [`Config::default`].
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given file does not exist
/// - The file cannot be read
/// - The JSON is malformed or has unknown fields
/// - A value fails validation
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) if !p.exists() => {
            return Err(ConfigError::NotFound {
                path: p.to_path_buf(),
            });
        }
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::debug!("No configuration file, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;
    tracing::debug!(path = %config_path.display(), "Configuration loaded");

    Ok(config)
}
