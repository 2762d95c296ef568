//! JSON-RPC 2.0 framing for MCP.
//!
//! Incoming lines are classified into requests (they carry an `id`) and
//! notifications (they do not). Outgoing messages are either a
//! [`JsonRpcResponse`] or a [`JsonRpcError`]. MCP narrows JSON-RPC in two
//! ways that [`parse_message`] enforces: ids are strings or integers, never
//! `null`, and batches are not accepted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of the `jsonrpc` member on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version offered when the client asks for one we do not speak.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions this server can speak, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 2] = ["2024-11-05", MCP_PROTOCOL_VERSION];

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "dataiku-mcp";

/// Picks the protocol version for a session: the client's own if we support
/// it, otherwise our latest.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// Request identifier: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// A request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A one-way message from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// A message read from the client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
}

/// A successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub result: Value,
}

impl JsonRpcResponse {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// Error codes defined by JSON-RPC 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
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

    const fn label(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

/// An error reply. `id` is absent when the request could not be read far
/// enough to learn it.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("JSON-RPC error {}: {}", .error.code, .error.message)]
pub struct JsonRpcError {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error,
        }
    }

    fn coded(id: Option<RequestId>, code: ErrorCode, detail: Option<&str>) -> Self {
        let message = detail.map_or_else(
            || code.label().to_string(),
            |d| format!("{}: {d}", code.label()),
        );
        Self::new(id, JsonRpcErrorData::with_message(code, message))
    }

    #[must_use]
    pub fn parse_error() -> Self {
        Self::coded(None, ErrorCode::ParseError, None)
    }

    #[must_use]
    pub fn invalid_request(id: Option<RequestId>, detail: &str) -> Self {
        Self::coded(id, ErrorCode::InvalidRequest, Some(detail))
    }

    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::coded(Some(id), ErrorCode::MethodNotFound, Some(method))
    }

    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Reads the id of a raw message, if it has a usable one.
fn request_id(message: &Map<String, Value>) -> Option<RequestId> {
    message
        .get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

/// Parses one line received from the client.
///
/// # Errors
///
/// Returns a parse error for malformed JSON and an invalid-request error for
/// JSON that is not a single JSON-RPC 2.0 message.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line).map_err(|_| JsonRpcError::parse_error())?;
    let message = match value {
        Value::Object(message) => message,
        Value::Array(_) => {
            return Err(JsonRpcError::invalid_request(None, "batches are not supported"))
        }
        _ => return Err(JsonRpcError::invalid_request(None, "expected an object")),
    };

    let id = request_id(&message);
    if message.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request(id, "jsonrpc must be \"2.0\""));
    }
    let method = message.get("method").and_then(Value::as_str);
    if !method.is_some_and(|m| !m.is_empty()) {
        return Err(JsonRpcError::invalid_request(id, "missing method"));
    }

    if !message.contains_key("id") {
        return serde_json::from_value(Value::Object(message))
            .map(IncomingMessage::Notification)
            .map_err(|e| JsonRpcError::invalid_request(None, &e.to_string()));
    }
    if id.is_none() {
        return Err(JsonRpcError::invalid_request(None, "id must be a string or an integer"));
    }
    serde_json::from_value(Value::Object(message))
        .map(IncomingMessage::Request)
        .map_err(|e| JsonRpcError::invalid_request(id, &e.to_string()))
}
