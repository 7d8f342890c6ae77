//! Model Context Protocol (MCP) server implementation.
//!
//! This module implements a JSON-RPC 2.0 engine for MCP servers. Messages are
//! carried in `Content-Length` framed envelopes over either stdio or TCP, and
//! every connection runs its own initialize handshake before tool requests are
//! handed to a [`ToolProvider`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Session   │───▶│  Provider   │    │
//! │   │ (stdio/tcp) │    │ (handshake) │    │   (tools)   │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                              │
//! │          ▼                  ▼                              │
//! │   ┌─────────────┐    ┌─────────────┐                       │
//! │   │   Framing   │    │  JSON-RPC   │                       │
//! │   │(Content-Len)│    │  messages   │                       │
//! │   └─────────────┘    └─────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod connection;
pub mod framing;
pub mod protocol;
pub mod provider;
pub mod server;
pub mod shutdown;
pub mod stream;
pub mod tcp;
pub mod transport;

pub use framing::{encode_frame, FrameBuffer, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE};
pub use protocol::{
    decode_request, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, RequestId,
    MCP_PROTOCOL_VERSION,
};
pub use provider::ToolProvider;
pub use server::{McpSession, SessionState};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use stream::FramedStream;
pub use tcp::{ConnectionLimiter, ConnectionLimits, TcpConfig, TcpTransport};
pub use transport::{StdioConfig, StdioTransport};
