//! MCP server
//!
//! JSON-RPC dispatcher over the projected tool list. Transport loops (stdio,
//! HTTP) hand raw messages to `handle_message` and write back whatever it
//! returns.

use crate::error::Result;
use crate::invocation::{CallContext, CancelHandle, CancelSignal};
use crate::mcp::errors::McpError;
use crate::mcp::types::{
    McpRequest, McpResponse, ServerInfo, Tool, ToolCall, DEFAULT_PROTOCOL_VERSION,
};
use crate::registry::ToolDefinition;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// MCP server exposing backend methods as tools
pub struct McpServer {
    info: ServerInfo,
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    in_flight: Mutex<HashMap<String, CancelHandle>>,
}

impl McpServer {
    /// Create a server over an immutable tool list
    pub fn new(info: ServerInfo, tools: Vec<ToolDefinition>) -> Self {
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| (tool.name.clone(), i))
            .collect();
        Self {
            info,
            tools,
            index,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Listing entries in projection order
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(ToolDefinition::to_mcp_tool).collect()
    }

    /// Look up a tool by name
    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Number of calls currently running
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Handle one raw JSON-RPC message, returning the response text if any
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        let request = match serde_json::from_str::<McpRequest>(message) {
            Ok(request) => request,
            Err(e) => {
                warn!("Unparsable JSON-RPC message: {}", e);
                return Some(Self::create_error_response(
                    None,
                    McpError::parse_error(format!("Parse error: {}", e)),
                ));
            }
        };

        let id = request.id.clone();
        match self.handle_mcp_request(request).await {
            Ok(response) => response,
            Err(e) => Some(Self::create_error_response(id.as_ref(), McpError::from(e))),
        }
    }

    /// Dispatch a parsed request
    pub async fn handle_mcp_request(&self, request: McpRequest) -> Result<Option<String>> {
        debug!("Handling MCP method: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => {
                let Some(id) = request.id.as_ref() else {
                    return Ok(Some(Self::create_error_response(
                        None,
                        McpError::invalid_request("Initialize request must have an ID".to_string()),
                    )));
                };
                let version = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("protocolVersion"))
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL_VERSION);
                Self::create_success_response(
                    id,
                    json!({
                        "protocolVersion": version,
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": self.info,
                    }),
                )
            }
            "initialized" | "notifications/initialized" => return Ok(None),
            "notifications/cancelled" => {
                self.cancel_request(request.params.as_ref()).await;
                return Ok(None);
            }
            "ping" => match request.id.as_ref() {
                Some(id) => Self::create_success_response(id, json!({})),
                None => return Ok(None),
            },
            "tools/list" => match request.id.as_ref() {
                Some(id) => Self::create_success_response(id, json!({ "tools": self.list_tools() })),
                None => Self::create_error_response(
                    None,
                    McpError::invalid_request("Request must have an ID".to_string()),
                ),
            },
            "tools/call" => {
                let Some(id) = request.id.as_ref() else {
                    return Ok(Some(Self::create_error_response(
                        None,
                        McpError::invalid_request("Request must have an ID".to_string()),
                    )));
                };
                let params = request.params.clone().unwrap_or_else(|| json!({}));
                let tool_call = match serde_json::from_value::<ToolCall>(params) {
                    Ok(call) => call,
                    Err(e) => {
                        return Ok(Some(Self::create_error_response(
                            Some(id),
                            McpError::invalid_params(format!("Invalid tool call parameters: {}", e)),
                        )))
                    }
                };
                return self.call_tool(id, tool_call).await.map(Some);
            }
            other => {
                if request.id.is_none() {
                    debug!("Ignoring unknown notification {}", other);
                    return Ok(None);
                }
                Self::create_error_response(
                    request.id.as_ref(),
                    McpError::method_not_found(other.to_string()),
                )
            }
        };

        Ok(Some(response))
    }

    async fn call_tool(&self, id: &Value, call: ToolCall) -> Result<String> {
        let Some(tool) = self.get_tool(&call.name) else {
            return Ok(Self::create_error_response(
                Some(id),
                McpError::tool_not_found(call.name.clone()),
            ));
        };

        let (handle, signal) = CancelSignal::pair();
        let key = request_key(id);
        self.in_flight.lock().await.insert(key.clone(), handle);

        debug!("Calling tool {}", tool.name);
        let context = CallContext::new(call.arguments).with_cancel(signal);
        let result = tool.call(context).await;

        self.in_flight.lock().await.remove(&key);

        Ok(Self::create_success_response(id, serde_json::to_value(&result)?))
    }

    async fn cancel_request(&self, params: Option<&Value>) {
        let Some(request_id) = params.and_then(|p| p.get("requestId")) else {
            debug!("Cancellation without requestId ignored");
            return;
        };
        let key = request_key(request_id);
        match self.in_flight.lock().await.remove(&key) {
            Some(handle) => {
                info!("Cancelling request {}", key);
                handle.cancel();
            }
            None => debug!("No in-flight request {} to cancel", key),
        }
    }

    /// Create a success JSON-RPC response
    fn create_success_response(id: &Value, result: Value) -> String {
        serialize_response(&McpResponse::success(id.clone(), result))
    }

    /// Create an error JSON-RPC response; `None` ids are sent as `null`
    pub fn create_error_response(id: Option<&Value>, error: McpError) -> String {
        serialize_response(&McpResponse::failure(id.cloned().unwrap_or(Value::Null), error))
    }
}

fn serialize_response(response: &McpResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!("Failed to serialize JSON-RPC response: {}", e);
        json!({
            "jsonrpc": "2.0",
            "id": response.id,
            "error": { "code": -32603, "message": "Internal error" }
        })
        .to_string()
    })
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// Cancellation table key: `1` and `"1"` are different ids
fn request_key(id: &Value) -> String {
    id.to_string()
}
