//! Integration tests for MCP protocol handling.
//!
//! These tests drive the public API the way a transport does: raw frames in,
//! raw frames out, with the dice roller as the tool provider.

use std::sync::Arc;

use serde_json::Value;

use mcp_framed_server::mcp::framing::{encode_frame, FrameBuffer, MAX_MESSAGE_SIZE};
use mcp_framed_server::mcp::protocol::{decode_request, RequestId, RequestParams};
use mcp_framed_server::mcp::{FramedStream, McpSession, SessionState, Shutdown, StdioConfig};
use mcp_framed_server::mcp::{StdioTransport, ToolProvider};
use mcp_framed_server::tools::DiceRoller;

// =============================================================================
// Helpers
// =============================================================================

fn dice_session() -> McpSession {
    let provider: Arc<dyn ToolProvider> = Arc::new(DiceRoller::new());
    McpSession::new(Some(provider))
}

async fn call(session: &mut McpSession, json: &str) -> Option<Value> {
    let bytes = session.handle_payload(json.as_bytes()).await?;
    Some(serde_json::from_slice(&bytes).unwrap())
}

fn decode_frames(output: &[u8]) -> Vec<Value> {
    let mut buffer = FrameBuffer::new();
    buffer.extend(output).unwrap();
    let mut values = Vec::new();
    while let Some(frame) = buffer.next_frame().unwrap() {
        values.push(serde_json::from_slice(&frame).unwrap());
    }
    values
}

// =============================================================================
// Protocol Decoding Tests
// =============================================================================

#[test]
fn test_decode_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let request = decode_request(json.as_bytes()).unwrap();
    assert_eq!(request.method, "initialize");
    assert_eq!(request.id, Some(RequestId::new("1")));

    let RequestParams::Initialize(params) = request.params else {
        panic!("Expected initialize params");
    };
    assert_eq!(params.protocol_version.as_deref(), Some("2024-11-05"));
    assert_eq!(params.client_info.unwrap().name, "test-client");
}

#[test]
fn test_decode_tool_call_request() {
    let json = br#"{"jsonrpc":"2.0","id":"c1","method":"tools/call","params":{"name":"roll_dice","arguments":{"sides":20}}}"#;

    let request = decode_request(json).unwrap();
    let RequestParams::CallTool(params) = request.params else {
        panic!("Expected tool call params");
    };
    assert_eq!(params.name, "roll_dice");
    assert_eq!(params.arguments["sides"], 20);
}

#[test]
fn test_decode_unknown_method_keeps_raw_params() {
    let json = br#"{"jsonrpc":"2.0","id":3,"method":"foo/bar","params":[1,2]}"#;
    let request = decode_request(json).unwrap();
    assert_eq!(request.raw_params(), Some(&serde_json::json!([1, 2])));
}

#[test]
fn test_decode_invalid_json() {
    let err = decode_request(b"not valid json").unwrap_err();
    assert!(err.id.is_none());
    assert!(err.message.starts_with("Parse error"));
}

// =============================================================================
// Session Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_handshake_then_roll() {
    let mut session = dice_session();

    let init = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":"1","method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
    )
    .await
    .unwrap();
    assert_eq!(init["jsonrpc"], "2.0");
    assert_eq!(init["id"], "1");
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["capabilities"], serde_json::json!({"tools": {}}));
    assert_eq!(init["result"]["serverInfo"]["name"], "mcp-framed-server");
    assert_eq!(session.state(), SessionState::Uninitialized);

    assert!(call(&mut session, r#"{"jsonrpc":"2.0","method":"initialized"}"#)
        .await
        .is_none());
    assert_eq!(session.state(), SessionState::Initialized);

    let roll = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":"2","method":"tools/call","params":{"name":"roll_dice","arguments":{"sides":6,"count":2}}}"#,
    )
    .await
    .unwrap();
    assert_eq!(roll["id"], "2");
    let text = roll["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("2d6"), "{text}");

    let unknown = call(&mut session, r#"{"jsonrpc":"2.0","id":"3","method":"foo/bar"}"#)
        .await
        .unwrap();
    assert_eq!(unknown["id"], "3");
    assert_eq!(unknown["error"]["code"], -32601);
}

#[tokio::test]
async fn test_requests_rejected_before_initialized() {
    let mut session = dice_session();

    let response = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":"1","method":"tools/call","params":{"name":"roll_dice"}}"#,
    )
    .await
    .unwrap();
    assert_eq!(response["error"]["code"], -32600);
    assert_eq!(response["error"]["message"], "Server not initialized");

    // initialize alone does not complete the handshake
    call(&mut session, r#"{"jsonrpc":"2.0","id":"2","method":"initialize"}"#).await;
    let response = call(&mut session, r#"{"jsonrpc":"2.0","id":"3","method":"ping"}"#)
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn test_tools_list_reports_dice() {
    let mut session = dice_session();
    let response = call(&mut session, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap();
    assert_eq!(response["id"], "1");
    assert_eq!(response["result"]["tools"][0]["name"], "roll_dice");
    assert!(response["result"]["tools"][0]["inputSchema"]["properties"]["sides"].is_object());
}

#[tokio::test]
async fn test_ping_after_initialized() {
    let mut session = dice_session();
    call(&mut session, r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
    let response = call(&mut session, r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
        .await
        .unwrap();
    assert_eq!(response["result"], serde_json::json!({}));
}

#[tokio::test]
async fn test_invalid_arguments_and_unknown_tool() {
    let mut session = dice_session();
    call(&mut session, r#"{"jsonrpc":"2.0","method":"initialized"}"#).await;

    let response = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"roll_dice","arguments":{"count":500}}}"#,
    )
    .await
    .unwrap();
    assert_eq!(response["error"]["code"], -32602);

    let response = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nope"}}"#,
    )
    .await
    .unwrap();
    assert_eq!(response["result"]["isError"], true);

    let response = call(
        &mut session,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":"roll_dice"}"#,
    )
    .await
    .unwrap();
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn test_parse_errors_recover_id() {
    let mut session = dice_session();

    let response = call(&mut session, r#"{"jsonrpc":"2.0","id":"abc","method":"#)
        .await
        .unwrap();
    assert_eq!(response["id"], "abc");
    assert_eq!(response["error"]["code"], -32700);

    let response = call(&mut session, "garbage").await.unwrap();
    assert_eq!(response["id"], "unknown");
    assert_eq!(response["error"]["code"], -32700);
}

#[tokio::test]
async fn test_wrong_jsonrpc_version() {
    let mut session = dice_session();
    let response = call(&mut session, r#"{"jsonrpc":"1.0","id":4,"method":"tools/list"}"#)
        .await
        .unwrap();
    assert_eq!(response["id"], "4");
    assert_eq!(response["error"]["code"], -32600);
}

// =============================================================================
// Framed Stream Tests
// =============================================================================

#[tokio::test]
async fn test_stdio_session_over_chunked_input() {
    let mut input = Vec::new();
    for message in [
        r#"{"jsonrpc":"2.0","id":"1","method":"initialize"}"#,
        r#"{"jsonrpc":"2.0","method":"initialized"}"#,
        r#"{"jsonrpc":"2.0","id":"2","method":"tools/call","params":{"name":"roll_dice"}}"#,
    ] {
        input.extend(encode_frame(message.as_bytes()));
    }

    // Deliver the bytes a few at a time so frames straddle reads.
    let mut reader = tokio_test::io::Builder::new();
    for chunk in input.chunks(7) {
        reader.read(chunk);
    }
    let reader = reader.build();

    let mut output = Vec::new();
    StdioTransport::new(StdioConfig::default())
        .serve(
            FramedStream::new(reader, &mut output),
            Some(Arc::new(DiceRoller::new())),
            Shutdown::never(),
        )
        .await
        .unwrap();

    let responses = decode_frames(&output);
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], "1");
    assert_eq!(responses[1]["id"], "2");
    assert!(responses[1]["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("1d6"));
}

#[tokio::test]
async fn test_oversized_frame_ends_session() {
    let header = format!("Content-Length: {}\r\n\r\n", MAX_MESSAGE_SIZE + 1);
    let mut output = Vec::new();

    let result = StdioTransport::default()
        .serve(
            FramedStream::new(header.as_bytes(), &mut output),
            None,
            Shutdown::never(),
        )
        .await;

    assert!(result.is_err());
    assert!(output.is_empty());
}
