//! The seam between the protocol engine and domain logic.

use async_trait::async_trait;

use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, ServerInfo, ToolDefinition};

/// Domain collaborator consulted by [`McpSession`](crate::mcp::server::McpSession).
///
/// One instance is typically shared by every connection, so implementations
/// must tolerate concurrent calls.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Identity reported in the `initialize` response.
    fn server_info(&self) -> ServerInfo;

    /// Tools reported by `tools/list`.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Handles a request the engine does not answer itself.
    ///
    /// Return `None` to decline: the engine then answers `Method not found`
    /// for requests and stays silent for notifications. Responses returned
    /// for notifications are discarded.
    async fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse>;
}
