/// JSON-RPC Dispatcher
///
/// Routes one decoded JSON-RPC message to the MCP method handlers:
/// - `initialize`: protocol version negotiation and server metadata
/// - `tools/list`: every registered tool with its input schema
/// - `tools/call`: argument binding and execution through the invoker
///
/// The dispatcher holds no per-request state. It only reads the immutable
/// tool registry, so one instance can serve any number of concurrent
/// workers.

use serde_json::{Number, Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::core::invoker;
use crate::core::protocol::{
    JsonRpcError, JsonRpcResponse, SUPPORTED_PROTOCOL_VERSION, ToolCallResult,
};
use crate::core::registry::ToolRegistry;

/// Server identity reported by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    info: ServerInfo,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, info: ServerInfo) -> Self {
        Self { registry, info }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Handle one JSON-RPC message.
    ///
    /// Returns `None` when no reply may be sent: the message is not an
    /// object, or it carries no numeric id to address a reply to.
    pub fn handle(&self, message: &Value) -> Option<JsonRpcResponse> {
        let request = message.as_object()?;
        let id = match request.get("id") {
            Some(Value::Number(id)) => id.clone(),
            _ => {
                debug!(method = ?request.get("method"), "dropping message without numeric id");
                return None;
            }
        };

        let method = match request.get("method").and_then(Value::as_str) {
            Some(method) if !method.trim().is_empty() => method,
            _ => return Some(JsonRpcResponse::failure(Some(id), JsonRpcError::invalid_request())),
        };
        let params = request.get("params");

        debug!(%id, method, "dispatching request");
        let response = match method {
            "initialize" => self.handle_initialize(id, params),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, params),
            _ => JsonRpcResponse::failure(Some(id), JsonRpcError::method_not_found(method)),
        };
        Some(response)
    }

    /// Echo the client's protocol version when it sends one, otherwise answer
    /// with the version this server speaks.
    fn handle_initialize(&self, id: Number, params: Option<&Value>) -> JsonRpcResponse {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(SUPPORTED_PROTOCOL_VERSION);

        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": protocol_version,
                "capabilities": {
                    "tools": {
                        "listChanged": false
                    }
                },
                "serverInfo": {
                    "name": self.info.name,
                    "version": self.info.version
                }
            }),
        )
    }

    /// Pagination cursors are accepted in any shape and ignored: the whole
    /// list always fits in one page.
    fn handle_tools_list(&self, id: Number) -> JsonRpcResponse {
        let tools: Vec<Value> = self
            .registry
            .list()
            .iter()
            .map(|tool| tool.to_listing())
            .collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    fn handle_tools_call(&self, id: Number, params: Option<&Value>) -> JsonRpcResponse {
        let params = match params {
            Some(params) if !params.is_null() => params,
            _ => {
                return JsonRpcResponse::failure(Some(id), JsonRpcError::invalid_params("Invalid params"));
            }
        };

        let tool_name = match params.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name,
            _ => {
                return JsonRpcResponse::failure(
                    Some(id),
                    JsonRpcError::invalid_params("Missing tool name"),
                );
            }
        };

        let result = match self.registry.find(tool_name) {
            Some(tool) => {
                let started_at = Instant::now();
                let outcome = invoker::invoke(tool, params.get("arguments"));
                info!(
                    tool = tool_name,
                    is_error = outcome.is_failure(),
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    "tool call finished"
                );
                ToolCallResult::from(outcome)
            }
            None => ToolCallResult::error(format!("Unknown tool: {}", tool_name)),
        };

        match serde_json::to_value(&result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::success(
                id,
                json!({
                    "content": [{"type": "text", "text": format!("Error: {}", e)}],
                    "isError": true
                }),
            ),
        }
    }
}
