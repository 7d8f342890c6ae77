//! mcp-framed-server: a JSON-RPC 2.0 engine for Model Context Protocol servers
//!
//! Messages travel in `Content-Length` framed envelopes over stdio or TCP.
//! Each connection runs the MCP initialize handshake and then hands tool
//! requests to a pluggable [`ToolProvider`](mcp::ToolProvider).
//!
//! # Architecture
//!
//! - **Framing**: incremental `Content-Length` parsing with hard size ceilings
//! - **Transports**: one stdio session, or many TCP sessions under an
//!   admission limit with per-operation read/write deadlines
//! - **Session**: per-connection handshake state and JSON-RPC dispatch
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: Framing, transports and the protocol state machine
//! - [`tools`]: Tool providers

pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;
