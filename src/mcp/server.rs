//! Per-connection MCP protocol state machine.
//!
//! An [`McpSession`] starts *uninitialised* and moves to *initialised* when
//! the client sends the `initialized` notification. It never goes back.
//!
//! | Method | Before `initialized` | After `initialized` |
//! |---|---|---|
//! | `initialize` | answered | answered |
//! | `initialized` | state change, no reply | no-op, no reply |
//! | `tools/list` | answered | answered |
//! | anything else | `-32600` (or silence for notifications) | `ping` answered here, the rest forwarded to the [`ToolProvider`] |
//!
//! Requests the provider declines are answered with `-32601`.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::{
    decode_request, JsonRpcRequest, JsonRpcResponse, RequestId, RequestParams,
    ServerCapabilities, ServerInfo, ToolDefinition, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_NOTIFICATIONS_INITIALIZED, METHOD_PING,
    METHOD_TOOLS_LIST,
};
use crate::mcp::provider::ToolProvider;

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `initialized` notification.
    Uninitialized,
    /// Handshake complete; domain methods are allowed.
    Initialized,
}

/// Protocol state for one connection.
pub struct McpSession {
    state: SessionState,
    provider: Option<Arc<dyn ToolProvider>>,
    verbose: bool,
}

impl McpSession {
    /// Creates an uninitialised session backed by `provider`.
    #[must_use]
    pub fn new(provider: Option<Arc<dyn ToolProvider>>) -> Self {
        Self {
            state: SessionState::Uninitialized,
            provider,
            verbose: false,
        }
    }

    /// Logs every request and response at info level instead of debug.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the current handshake state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the handshake has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Initialized
    }

    /// Handles one framed payload and returns the serialised response, if any.
    pub async fn handle_payload(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        let response = match decode_request(payload) {
            Ok(request) => self.handle_request(request).await?,
            Err(error) => {
                warn!(
                    id = error.id.as_ref().map_or("-", RequestId::as_str),
                    bytes = payload.len(),
                    "{}",
                    error.message
                );
                error.into_response()
            }
        };

        encode_response(&response)
    }

    /// Handles one decoded request.
    ///
    /// Returns `None` for notifications and for anything that must not be
    /// answered.
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.log_request(&request);

        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.map(|id| {
                JsonRpcResponse::invalid_request(id, "jsonrpc field must be \"2.0\"")
            });
        }

        let response = match request.method.as_str() {
            METHOD_INITIALIZE => Some(self.handle_initialize(&request)),
            METHOD_INITIALIZED | METHOD_NOTIFICATIONS_INITIALIZED => {
                self.mark_initialized();
                None
            }
            METHOD_TOOLS_LIST => request.id.clone().map(|id| self.handle_tools_list(id)),
            _ => self.dispatch(request).await,
        };

        if let Some(ref response) = response {
            self.log_response(response);
        }
        response
    }

    fn mark_initialized(&mut self) {
        if self.state == SessionState::Uninitialized {
            info!("Client initialised, session ready");
        }
        self.state = SessionState::Initialized;
    }

    /// Handles the initialize request.
    fn handle_initialize(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(id) = request.id.clone() else {
            warn!("initialize sent without an id");
            return JsonRpcResponse::invalid_request(
                RequestId::unknown(),
                "initialize must be sent as a request with an id",
            );
        };

        match &request.params {
            RequestParams::Invalid { reason } => {
                return JsonRpcResponse::invalid_params(id, reason.clone());
            }
            RequestParams::Initialize(params) => {
                if let Some(client) = &params.client_info {
                    info!(
                        client = %client.name,
                        client_version = client.version.as_deref().unwrap_or("unknown"),
                        requested_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
                        "Client connected"
                    );
                }
            }
            _ => {}
        }

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": self.server_info(),
        });

        JsonRpcResponse::success(id, result)
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, id: RequestId) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "tools": self.tools() }))
    }

    /// Routes every method the handshake does not cover.
    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if !self.is_initialized() {
            if request.is_notification() {
                debug!(method = %request.method, "Dropping notification before initialisation");
            }
            return request.id.map(JsonRpcResponse::not_initialized);
        }

        if let RequestParams::Invalid { reason } = &request.params {
            return request
                .id
                .clone()
                .map(|id| JsonRpcResponse::invalid_params(id, reason.clone()));
        }

        if request.method == METHOD_PING {
            return request.id.map(|id| JsonRpcResponse::success(id, json!({})));
        }

        let handled = match &self.provider {
            Some(provider) => provider.handle(&request).await,
            None => None,
        };

        let id = request.id?;
        let Some(mut response) = handled else {
            return Some(JsonRpcResponse::method_not_found(id, &request.method));
        };

        if response.id != id {
            warn!(expected = %id, got = %response.id, "Tool provider answered with a foreign id");
            response.id = id;
        }
        Some(response)
    }

    fn server_info(&self) -> ServerInfo {
        self.provider
            .as_ref()
            .map_or_else(ServerInfo::default, |p| p.server_info())
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.provider
            .as_ref()
            .map_or_else(Vec::new, |p| p.tools())
    }

    fn log_request(&self, request: &JsonRpcRequest) {
        let id = request.id.as_ref().map_or("-", RequestId::as_str);
        if self.verbose {
            info!(method = %request.method, id, "Request received");
        } else {
            debug!(method = %request.method, id, "Request received");
        }
    }

    fn log_response(&self, response: &JsonRpcResponse) {
        let code = response.error_data().map(|e| e.code);
        if self.verbose {
            info!(id = %response.id, ?code, "Response ready");
        } else {
            debug!(id = %response.id, ?code, "Response ready");
        }
    }
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("state", &self.state)
            .field("has_provider", &self.provider.is_some())
            .field("verbose", &self.verbose)
            .finish()
    }
}

fn encode_response(response: &JsonRpcResponse) -> Option<Vec<u8>> {
    match serde_json::to_vec(response) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(error = %e, id = %response.id, "Failed to serialise response");
            let fallback = JsonRpcResponse::internal_error(
                response.id.clone(),
                "Internal error: failed to serialise response",
            );
            serde_json::to_vec(&fallback).ok()
        }
    }
}
