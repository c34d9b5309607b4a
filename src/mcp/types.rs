//! JSON-RPC 2.0 types for the MCP surface.

use crate::error::AgramaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version advertised by `initialize`.
pub const MCP_VERSION: &str = "2024-11-05";

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request (or notification, when `id` is absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be exactly "2.0"
    #[serde(default)]
    pub jsonrpc: String,
    /// Absent for notifications
    pub id: Option<Value>,
    /// Method name
    #[serde(default)]
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Whether this message is a notification (no id, no response).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Validate the JSON-RPC envelope.
    pub fn validate(&self) -> Result<(), JsonRpcError> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(JsonRpcError::invalid_request("jsonrpc must be \"2.0\""));
        }
        if self.method.is_empty() {
            return Err(JsonRpcError::invalid_request("method is required"));
        }
        Ok(())
    }
}

/// JSON-RPC response. Exactly one of `result` / `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Mirrors the request id (null for undecodable requests)
    pub id: Option<Value>,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Standard or server error code
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Structured detail (the error kind name, for engine failures)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32700` — the line was not valid JSON.
    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    /// `-32600` — the message was not a valid JSON-RPC 2.0 request.
    pub fn invalid_request(message: &str) -> Self {
        Self::new(-32600, format!("Invalid request: {message}"))
    }

    /// `-32601` — unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {method}"))
    }

    /// `-32602` — invalid params.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    /// `-32000` — server-side execution failure.
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(-32000, message)
    }
}

impl From<&AgramaError> for JsonRpcError {
    /// Map an engine error to its wire code, carrying the kind name in
    /// `data`.
    fn from(err: &AgramaError) -> Self {
        Self {
            code: err.jsonrpc_code(),
            message: err.to_string(),
            data: Some(Value::String(err.kind().to_string())),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.method, "tools/list");
        assert!(!request.is_notification());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_notification_has_no_id() {
        let json = r#"{"jsonrpc":"2.0","method":"initialized"}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn test_missing_version_is_invalid() {
        let json = r#"{"id":1,"method":"tools/list"}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(err.code, -32600);
    }

    #[test]
    fn test_missing_method_is_invalid() {
        let json = r#"{"jsonrpc":"2.0","id":1}"#;
        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.validate().unwrap_err().code, -32600);
    }

    #[test]
    fn test_response_exactly_one_of_result_error() {
        let ok = JsonRpcResponse::success(Some(1.into()), serde_json::json!({"ok": true}));
        assert!(ok.result.is_some() && ok.error.is_none());
        let serialized = serde_json::to_string(&ok).unwrap();
        assert!(!serialized.contains("error"));

        let err = JsonRpcResponse::error(Some(1.into()), JsonRpcError::method_not_found("x"));
        assert!(err.result.is_none() && err.error.is_some());
        let serialized = serde_json::to_string(&err).unwrap();
        assert!(!serialized.contains("result"));
    }

    #[test]
    fn test_engine_error_mapping() {
        let err = AgramaError::InvalidSearchType {
            search_type: "psychic".into(),
        };
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, -32602);
        assert_eq!(wire.data, Some(Value::String("InvalidSearchType".into())));

        let err = AgramaError::PoolExhausted {
            pool: "arena".into(),
            cap: 8,
        };
        let wire: JsonRpcError = (&err).into();
        assert_eq!(wire.code, -32000);
    }
}
