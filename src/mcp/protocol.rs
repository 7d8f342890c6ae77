//! JSON-RPC 2.0 message types for the MCP protocol.
//!
//! Incoming payloads are decoded in two phases: the envelope first (version
//! tag, identifier, method name), then a method-specific parameter shape
//! chosen by the method name. Identifiers are normalised to text so the rest
//! of the engine never has to care whether the peer sent `"7"` or `7`.
//!
//! # Message Types
//!
//! - **Request**: carries an `id` and expects exactly one response
//! - **Notification**: no `id` (or `"id": null`); never answered
//! - **Response**: echoes the request `id` with either `result` or `error`

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// The only JSON-RPC version accepted.
pub const JSONRPC_VERSION: &str = "2.0";

/// Identifier used when a response cannot be correlated to a request.
pub const UNKNOWN_ID: &str = "unknown";

/// Handshake request; always legal.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Handshake completion notification.
pub const METHOD_INITIALIZED: &str = "initialized";
/// Namespaced spelling of [`METHOD_INITIALIZED`] used by most MCP clients.
pub const METHOD_NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";
/// Tool enumeration.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Tool invocation, forwarded to the tool provider.
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Liveness check.
pub const METHOD_PING: &str = "ping";

/// A JSON-RPC request identifier in normalised text form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates an identifier from its text form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder used for responses that cannot be correlated.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_ID.to_string())
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalises a wire identifier.
    ///
    /// Strings are kept as-is, numbers become their decimal text and `null`
    /// means "no identifier".
    ///
    /// # Errors
    ///
    /// Returns an error message for booleans, arrays and objects.
    pub fn from_value(value: &Value) -> Result<Option<Self>, String> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Self(s.clone()))),
            Value::Number(n) => Ok(Some(Self::from_number(n))),
            other => Err(format!(
                "id must be a string or a number, got {}",
                type_name(other)
            )),
        }
    }

    fn from_number(n: &Number) -> Self {
        Self(n.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Method-specific parameters, selected by method name during decode.
#[derive(Debug, Clone)]
pub enum RequestParams {
    /// No `params` member was sent.
    None,
    /// Parameters of `initialize`.
    Initialize(InitializeParams),
    /// Parameters of `tools/call`.
    CallTool(ToolCallParams),
    /// Parameters of any other method, left undecoded.
    Raw(Value),
    /// `params` was present but did not match the method's shape.
    Invalid {
        /// Why decoding failed.
        reason: String,
    },
}

impl RequestParams {
    fn decode(method: &str, params: Option<Value>) -> Self {
        let Some(params) = params else {
            return Self::None;
        };

        match method {
            METHOD_INITIALIZE => serde_json::from_value::<InitializeParams>(params)
                .map_or_else(|e| Self::invalid("initialize", &e), Self::Initialize),
            METHOD_TOOLS_CALL => serde_json::from_value::<ToolCallParams>(params)
                .map_or_else(|e| Self::invalid("tool call", &e), Self::CallTool),
            _ => Self::Raw(params),
        }
    }

    fn invalid(what: &str, error: &serde_json::Error) -> Self {
        Self::Invalid {
            reason: format!("Invalid {what} params: {error}"),
        }
    }
}

/// A decoded JSON-RPC request or notification.
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    /// Version tag as sent by the peer.
    pub jsonrpc: String,
    /// Normalised identifier; `None` for notifications.
    pub id: Option<RequestId>,
    /// The method to invoke.
    pub method: String,
    /// Method-specific parameters.
    pub params: RequestParams,
}

impl JsonRpcRequest {
    /// Returns `true` if no response may be sent for this message.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Returns the raw parameters for methods the engine does not decode.
    #[must_use]
    pub const fn raw_params(&self) -> Option<&Value> {
        match &self.params {
            RequestParams::Raw(value) => Some(value),
            _ => None,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }

    /// Returns the default message for this error code.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Creates a new error from an error code.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Adds additional data to the error.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The payload of a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseOutcome {
    /// Successful result.
    Result(Value),
    /// Error object.
    Error(JsonRpcErrorData),
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The identifier of the request this answers.
    pub id: RequestId,

    /// Result or error.
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

impl JsonRpcResponse {
    /// Creates a new success response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: ResponseOutcome::Result(result),
        }
    }

    /// Creates a new error response.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn error(id: RequestId, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            outcome: ResponseOutcome::Error(error),
        }
    }

    /// Creates a parse error response.
    #[must_use]
    pub fn parse_error(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::error(
            id.unwrap_or_else(RequestId::unknown),
            JsonRpcErrorData::with_message(ErrorCode::ParseError, message),
        )
    }

    /// Creates an invalid request error response.
    #[must_use]
    pub fn invalid_request(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, message),
        )
    }

    /// Creates the error sent for methods called before the handshake.
    #[must_use]
    pub fn not_initialized(id: RequestId) -> Self {
        Self::invalid_request(id, "Server not initialized")
    }

    /// Creates a method not found error response.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::error(
            id,
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Creates an invalid params error response.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Creates an internal error response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }

    /// Returns the error object, if this is an error response.
    #[must_use]
    pub const fn error_data(&self) -> Option<&JsonRpcErrorData> {
        match &self.outcome {
            ResponseOutcome::Error(error) => Some(error),
            ResponseOutcome::Result(_) => None,
        }
    }

    /// Returns the result value, if this is a success response.
    #[must_use]
    pub const fn result(&self) -> Option<&Value> {
        match &self.outcome {
            ResponseOutcome::Result(result) => Some(result),
            ResponseOutcome::Error(_) => None,
        }
    }
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server identity reported in the initialize response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// A payload that could not be decoded into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Identifier recovered from the raw bytes, if any.
    pub id: Option<RequestId>,
    /// Description of the failure.
    pub message: String,
}

impl DecodeError {
    /// Converts the failure into the parse error response sent to the peer.
    #[must_use]
    pub fn into_response(self) -> JsonRpcResponse {
        JsonRpcResponse::parse_error(self.id, self.message)
    }
}

/// Envelope fields decoded before the parameter shape is known.
#[derive(Deserialize)]
struct Envelope {
    jsonrpc: String,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Decodes a framed payload into a request.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the payload is not JSON, not an object, or
/// lacks the `jsonrpc`/`method` members. The error carries whatever
/// identifier could still be recovered so the parse error can be correlated.
pub fn decode_request(payload: &[u8]) -> Result<JsonRpcRequest, DecodeError> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| DecodeError {
        id: recover_id(payload),
        message: format!("Parse error: {e}"),
    })?;

    if !value.is_object() {
        return Err(DecodeError {
            id: None,
            message: format!("Parse error: expected an object, got {}", type_name(&value)),
        });
    }

    let fallback_id = value
        .get("id")
        .and_then(|id| RequestId::from_value(id).ok().flatten());

    let envelope: Envelope = serde_json::from_value(value).map_err(|e| DecodeError {
        id: fallback_id.clone(),
        message: format!("Parse error: {e}"),
    })?;

    let id = RequestId::from_value(&envelope.id).map_err(|reason| DecodeError {
        id: None,
        message: format!("Parse error: {reason}"),
    })?;

    let params = RequestParams::decode(&envelope.method, envelope.params);

    Ok(JsonRpcRequest {
        jsonrpc: envelope.jsonrpc,
        id,
        method: envelope.method,
        params,
    })
}

/// Recovers a request identifier from bytes that failed to decode.
///
/// This only looks for the first `"id": <string|number>` member and never
/// fails; anything it cannot make sense of yields `None`.
#[must_use]
pub fn recover_id(payload: &[u8]) -> Option<RequestId> {
    static ID_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = ID_PATTERN
        .get_or_init(|| {
            Regex::new(
                r#""id"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?))"#,
            )
            .ok()
        })
        .as_ref()?;

    let text = String::from_utf8_lossy(payload);
    let captures = pattern.captures(&text)?;

    if let Some(quoted) = captures.get(1) {
        let raw = quoted.as_str();
        let unescaped = serde_json::from_str::<String>(&format!("\"{raw}\""))
            .unwrap_or_else(|_| raw.to_string());
        return Some(RequestId::new(unescaped));
    }

    let number = captures.get(2)?.as_str();
    serde_json::from_str::<Number>(number)
        .ok()
        .map(|n| RequestId::from_number(&n))
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
