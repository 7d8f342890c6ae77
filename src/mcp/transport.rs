//! stdio transport for MCP server.
//!
//! This module implements the stdio transport:
//!
//! - stdin: receives Content-Length framed messages from the client
//! - stdout: sends framed responses to the client
//! - stderr: may be used for logging (never MCP messages)
//!
//! There is exactly one connection per process. The transport runs until the
//! client closes stdin, an unrecoverable framing or I/O error occurs, or
//! shutdown is requested.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;
use crate::mcp::connection::serve_connection;
use crate::mcp::provider::ToolProvider;
use crate::mcp::server::McpSession;
use crate::mcp::shutdown::Shutdown;
use crate::mcp::stream::FramedStream;

/// Settings for the stdio transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioConfig {
    /// Log every message at info level.
    pub verbose: bool,
}

/// A stdio-based MCP transport.
#[derive(Debug, Clone, Default)]
pub struct StdioTransport {
    config: StdioConfig,
}

impl StdioTransport {
    /// Creates a new stdio transport.
    #[must_use]
    pub const fn new(config: StdioConfig) -> Self {
        Self { config }
    }

    /// Serves the process's stdin/stdout.
    ///
    /// # Errors
    ///
    /// Returns the framing or I/O error that ended the session.
    pub async fn run(
        &self,
        provider: Option<Arc<dyn ToolProvider>>,
        shutdown: Shutdown,
    ) -> Result<(), TransportError> {
        let stream = FramedStream::new(tokio::io::stdin(), tokio::io::stdout());
        self.serve(stream, provider, shutdown).await
    }

    /// Serves an arbitrary framed stream as if it were stdio.
    ///
    /// # Errors
    ///
    /// Returns the framing or I/O error that ended the session.
    pub async fn serve<R, W>(
        &self,
        mut stream: FramedStream<R, W>,
        provider: Option<Arc<dyn ToolProvider>>,
        shutdown: Shutdown,
    ) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = McpSession::new(provider).with_verbose(self.config.verbose);

        tracing::info!("stdio transport ready, waiting for client messages");
        let result = serve_connection(&mut stream, &mut session, &shutdown).await;

        match &result {
            Ok(processed) => tracing::info!(processed, "stdio session ended"),
            Err(e) => tracing::error!(error = %e, "stdio session failed"),
        }
        result.map(|_| ())
    }
}
