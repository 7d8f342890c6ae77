//! Error types for mcp-framed-server.
//!
//! Protocol-level failures (bad JSON, unknown methods, handshake violations)
//! are not represented here: they are answered with JSON-RPC error responses
//! and the connection keeps serving. The types below cover failures that end
//! a connection, stop a transport, or prevent start-up.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while extracting frames from a byte stream.
///
/// Every variant is fatal to the connection that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// The header block is not a single `Content-Length: <n>` field.
    #[error("malformed frame header: {reason}")]
    MalformedHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// The Content-Length value is not a non-negative decimal integer.
    #[error("invalid Content-Length value: {value:?}")]
    InvalidContentLength {
        /// The raw header value.
        value: String,
    },

    /// The declared payload length exceeds the message ceiling.
    #[error("declared content length {declared} exceeds maximum of {max} bytes")]
    ContentTooLarge {
        /// Declared length (saturated at `u64::MAX` for absurd values).
        declared: u64,
        /// Maximum accepted payload size.
        max: usize,
    },

    /// Unframed bytes would grow past the buffer ceiling.
    #[error("pending buffer of {size} bytes exceeds maximum of {max} bytes")]
    BufferOverflow {
        /// Size the buffer would have reached.
        size: usize,
        /// Buffer ceiling.
        max: usize,
    },
}

/// Errors that terminate a connection or a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer sent bytes that cannot be framed.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// Reading from the channel failed with a non-retryable error.
    #[error("read failed")]
    Read {
        /// The underlying IO error, captured at the failing call.
        #[source]
        source: std::io::Error,
    },

    /// Writing to the channel failed with a non-retryable error.
    #[error("write failed")]
    Write {
        /// The underlying IO error, captured at the failing call.
        #[source]
        source: std::io::Error,
    },

    /// No bytes arrived within the read deadline.
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// The channel did not accept bytes within the write deadline.
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The bind host/port pair is not a usable socket address.
    #[error("invalid bind address: {addr}")]
    InvalidAddress {
        /// The offending `host:port` string.
        addr: String,
    },

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}")]
    Bind {
        /// The address we tried to bind.
        addr: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// An accepted socket could not be configured.
    #[error("failed to configure accepted socket")]
    Configure {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Signal handlers could not be installed.
    #[error("failed to install signal handler")]
    Signal {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Returns `true` for errors that mean the peer simply went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            Self::Read { source } | Self::Write { source } => matches!(
                source.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
