//! MCP server: JSON-RPC method dispatch against the primitive engine.

use crate::engine::PrimitiveEngine;
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::primitives::tool_registry;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// The canonical MCP server.
///
/// One implementation, one behavior: `initialize`, the `initialized`
/// notification, `tools/list` (generated from the primitive registry,
/// never hard-coded), and `tools/call` (forwarded to the engine).
pub struct McpServer {
    engine: PrimitiveEngine,
    /// Agent identity for calls that don't carry one
    default_agent: String,
    initialized: bool,
}

impl McpServer {
    /// Wrap an engine.
    pub fn new(engine: PrimitiveEngine) -> Self {
        Self {
            engine,
            default_agent: "mcp-client".to_string(),
            initialized: false,
        }
    }

    /// Set the fallback agent identity.
    pub fn with_default_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.default_agent = agent_id.into();
        self
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &PrimitiveEngine {
        &self.engine
    }

    /// Handle one raw line from the transport, single request or batch.
    ///
    /// Returns the serialized response, or `None` when no response is
    /// owed (a notification, or a batch of only notifications). A line
    /// that is not JSON yields a parse-error response with a null id; an
    /// empty batch is an invalid request. Batch items are executed in
    /// order and surface per-item results.
    pub fn handle_raw(&mut self, line: &str) -> Option<String> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!("unparseable request: {err}");
                let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                return serde_json::to_string(&response).ok();
            }
        };

        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    let response = JsonRpcResponse::error(
                        None,
                        JsonRpcError::invalid_request("empty batch"),
                    );
                    return serde_json::to_string(&response).ok();
                }
                let responses: Vec<JsonRpcResponse> = items
                    .into_iter()
                    .filter_map(|item| self.handle_value(item))
                    .collect();
                if responses.is_empty() {
                    None
                } else {
                    serde_json::to_string(&responses).ok()
                }
            }
            other => {
                let response = self.handle_value(other)?;
                serde_json::to_string(&response).ok()
            }
        }
    }

    fn handle_value(&mut self, value: Value) -> Option<JsonRpcResponse> {
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request),
            Err(_) => Some(JsonRpcResponse::error(
                None,
                JsonRpcError::invalid_request("not a request object"),
            )),
        }
    }

    /// Handle one raw line known to hold a single request.
    ///
    /// Returns `None` when no response is owed (notifications). A line
    /// that is not JSON yields a parse-error response with a null id.
    pub fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!("unparseable request: {err}");
                return Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()));
            }
        };
        self.handle_request(request)
    }

    /// Handle one decoded request.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if let Err(err) = request.validate() {
            // Notifications never get responses, even broken ones
            if request.is_notification() {
                return None;
            }
            return Some(JsonRpcResponse::error(request.id, err));
        }

        let id = request.id.clone();
        debug!(method = %request.method, "mcp request");

        match request.method.as_str() {
            "initialize" => {
                self.initialized = true;
                Some(JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": MCP_VERSION,
                        "serverInfo": {
                            "name": "agrama",
                            "version": env!("CARGO_PKG_VERSION"),
                        },
                        "capabilities": {
                            "tools": {"listChanged": false}
                        }
                    }),
                ))
            }

            "initialized" => {
                // Notification: acknowledge silently
                None
            }

            "tools/list" => Some(JsonRpcResponse::success(id, self.list_tools())),

            "tools/call" => {
                if request.is_notification() {
                    return None;
                }
                Some(self.call_tool(id, request.params.unwrap_or(Value::Null)))
            }

            other => {
                if request.is_notification() {
                    return None;
                }
                Some(JsonRpcResponse::error(
                    id,
                    JsonRpcError::method_not_found(other),
                ))
            }
        }
    }

    /// Whether `initialize` has been seen.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = tool_registry()
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "title": spec.title,
                    "description": spec.description,
                    "inputSchema": spec.input_schema,
                    "outputSchema": spec.output_schema,
                    "performance": spec.performance,
                    "compositionExamples": spec.composition_examples,
                })
            })
            .collect();
        json!({"tools": tools})
    }

    fn call_tool(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params("tools/call requires a tool name"),
            );
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let agent_id = arguments
            .get("agent_id")
            .and_then(|a| a.as_str())
            .unwrap_or(&self.default_agent)
            .to_string();

        match self.engine.execute(&agent_id, name, &arguments) {
            Ok(value) => {
                let execution_time = value.get("execution_time_ms").cloned().unwrap_or(Value::Null);
                let text = serde_json::to_string(&value)
                    .unwrap_or_else(|_| "{}".to_string());
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": false,
                        "metadata": {
                            "execution_time_ms": execution_time,
                            "agent_id": agent_id,
                        }
                    }),
                )
            }
            Err(err) => JsonRpcResponse::error(id, (&err).into()),
        }
    }
}
