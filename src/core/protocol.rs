/// JSON-RPC 2.0 and MCP Message Types
///
/// Response envelopes produced by the dispatcher and the MCP-specific result
/// payloads (`tools/call` results). Requests are consumed as raw
/// `serde_json::Value` because the dispatcher must tolerate arbitrarily
/// malformed envelopes without failing deserialization up front.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// JSON-RPC protocol version carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version answered when the client does not propose one.
pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request structure, as sent by `RpcClient`.
///
/// A request without an id is a notification and gets no reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// Responses always carry the numeric id of the request they answer and
/// either a result or an error, never both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    /// JSON-RPC version identifier, always "2.0"
    pub jsonrpc: String,
    /// Id of the originating request; `None` only for parse errors sent
    /// before an id could be read
    pub id: Option<Number>,
    /// Response result, present when the request succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information, present when the request failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Number, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Number>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// The id as an unsigned integer, when it is one.
    pub fn id_u64(&self) -> Option<u64> {
        self.id.as_ref().and_then(Number::as_u64)
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JsonRpcError {
    /// JSON-RPC error code (e.g., -32601 for method not found)
    pub code: i32,
    /// Short human-readable message
    pub message: String,
    /// Optional additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {}", detail.into()))
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

/// One item of a tool result's content list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Result payload of `tools/call`.
///
/// A failing tool is still a successful JSON-RPC response: the failure is
/// reported in-band with `is_error` set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: true,
        }
    }

    /// All text items joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notifications_have_no_id_field() {
        let encoded = serde_json::to_value(JsonRpcRequest::notification("ping", None)).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "method": "ping"}));
    }

    #[test]
    fn success_response_omits_error() {
        let response = JsonRpcResponse::success(Number::from(7), json!({"ok": true}));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded, json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}}));
    }

    #[test]
    fn error_response_omits_result() {
        let response =
            JsonRpcResponse::failure(Some(Number::from(3)), JsonRpcError::method_not_found("x/y"));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["error"]["code"], json!(-32601));
        assert_eq!(encoded["error"]["message"], json!("Method not found: x/y"));
        assert!(encoded.get("result").is_none());
    }

    #[test]
    fn parse_error_serializes_null_id() {
        let response = JsonRpcResponse::failure(None, JsonRpcError::parse_error("eof"));
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["id"], Value::Null);
        assert_eq!(encoded["error"]["code"], json!(PARSE_ERROR));
    }

    #[test]
    fn tool_call_result_uses_mcp_field_names() {
        let result = ToolCallResult::error("Unknown tool: nope");
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(
            encoded,
            json!({
                "content": [{"type": "text", "text": "Unknown tool: nope"}],
                "isError": true
            })
        );
    }

    #[test]
    fn tool_call_result_tolerates_missing_is_error() {
        let decoded: ToolCallResult =
            serde_json::from_value(json!({"content": [{"type": "text", "text": "hi"}]})).unwrap();
        assert!(!decoded.is_error);
        assert_eq!(decoded.text(), "hi");
    }
}
