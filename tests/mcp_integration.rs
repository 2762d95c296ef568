//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, lifecycle management,
//! and tool and resource calls against a scripted DSS.

mod common;

use common::{dss, MockDss};
use dataiku_mcp::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcRequest, RequestId,
};
use dataiku_mcp::mcp::server::{McpServer, ServerState};
use serde_json::{json, Value};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
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

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_tools_list_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, RequestId::Number(2));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_invalid_json() {
    let json = "not valid json";

    let result = parse_message(json);
    assert!(result.is_err());
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let result = parse_message(json);
    assert!(result.is_err());
}

// =============================================================================
// Session Tests
// =============================================================================

fn request(raw: &str) -> JsonRpcRequest {
    match parse_message(raw) {
        Ok(IncomingMessage::Request(req)) => req,
        _ => panic!("Expected Request: {raw}"),
    }
}

fn request_with(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    request(&json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string())
}

/// Runs the initialize handshake against a fresh server.
async fn running_server(mock: &std::sync::Arc<MockDss>) -> McpServer {
    let mut server = McpServer::new(dss(mock));
    server
        .respond(&request_with(
            1,
            "initialize",
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }),
        ))
        .await
        .unwrap();

    let initialized = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
    match parse_message(initialized) {
        Ok(IncomingMessage::Notification(notif)) => server.handle_notification(&notif),
        _ => panic!("Expected Notification"),
    }
    assert_eq!(server.state(), ServerState::Running);
    server
}

#[test]
fn test_handshake_negotiates_protocol() {
    let mock = MockDss::new();
    tokio_test::block_on(async {
        let mut server = McpServer::new(dss(&mock));
        let response = server
            .respond(&request_with(1, "initialize", json!({"protocolVersion": "2024-11-05"})))
            .await
            .unwrap();

        assert_eq!(response.result["serverInfo"]["name"], "dataiku-mcp");
        assert_eq!(
            response.result["capabilities"],
            json!({"tools": {}, "resources": {}})
        );
        assert_eq!(server.state(), ServerState::Initialising);
        assert!(server.protocol_version().is_some());
    });
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_requests_before_initialisation_are_rejected() {
    let mock = MockDss::new();
    let mut server = McpServer::new(dss(&mock));

    let err = server
        .respond(&request_with(1, "tools/list", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/SALES/recipes/",
        json!([{"name": "compute_orders", "type": "python"}]),
    );
    let mut server = running_server(&mock).await;

    let response = server
        .respond(&request_with(
            2,
            "tools/call",
            json!({"name": "list_recipes", "arguments": {"project_key": "SALES"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.id, RequestId::Number(2));
    assert!(response.result.get("isError").is_none());
    let text = response.result["content"][0]["text"].as_str().unwrap();
    let body: Value = serde_json::from_str(text).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["recipes"][0]["name"], "compute_orders");
}

#[tokio::test]
async fn test_tool_errors_stay_in_the_result() {
    let mock = MockDss::new();
    mock.fail("GET /projects/SALES/recipes/", 401, "Invalid API key");
    let mut server = running_server(&mock).await;

    let response = server
        .respond(&request_with(
            3,
            "tools/call",
            json!({"name": "list_recipes", "arguments": {"project_key": "SALES"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.result["isError"], true);
    let text = response.result["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("DSS returned HTTP 401: Invalid API key"));
}

#[tokio::test]
async fn test_tool_call_without_params_is_invalid() {
    let mock = MockDss::new();
    let mut server = running_server(&mock).await;

    let err = server
        .respond(&request(r#"{"jsonrpc": "2.0", "id": 4, "method": "tools/call"}"#))
        .await
        .unwrap_err();
    assert_eq!(err.error.code, ErrorCode::InvalidParams.code());
}

#[tokio::test]
async fn test_read_project_resources() {
    let mock = MockDss::new();
    mock.on(
        "GET /projects/",
        json!([{"projectKey": "SALES"}, {"projectKey": "MARKETING"}]),
    )
    .on(
        "GET /projects/SALES/metadata",
        json!({"label": "Sales", "description": "Revenue reporting"}),
    );
    let mut server = running_server(&mock).await;

    let listing = server
        .respond(&request_with(5, "resources/read", json!({"uri": "projects://"})))
        .await
        .unwrap();
    let text = listing.result["contents"][0]["text"].as_str().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(text).unwrap(),
        json!({"projects": ["SALES", "MARKETING"]})
    );

    let project = server
        .respond(&request_with(6, "resources/read", json!({"uri": "project://SALES"})))
        .await
        .unwrap();
    assert_eq!(
        project.result["contents"][0]["mimeType"],
        "application/json"
    );
    let text = project.result["contents"][0]["text"].as_str().unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(text).unwrap(),
        json!({"key": "SALES", "name": "Sales", "description": "Revenue reporting"})
    );
}
