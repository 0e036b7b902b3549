//! JSON-RPC wire types for the agent child process.
//!
//! The child speaks newline-delimited JSON over stdio. Outgoing requests carry
//! integer ids; replies are matched by strict integer comparison after a
//! lenient parse of the `id` member, because some server builds stringify ids.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Best-effort integer id: accepts a JSON number or a decimal string.
    pub fn id_u64(&self) -> Option<u64> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// JSON-RPC error member. Some child builds omit `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC notification (no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some("2.0".to_string()),
            method: method.to_string(),
            params,
        }
    }
}

/// One classified line of child stdout.
#[derive(Debug, Clone)]
pub enum Line {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    /// Not JSON, or JSON of an unexpected shape. Surfaced to subscribers as a
    /// stderr-kind event rather than dropped.
    Unparsed(String),
}

/// Sort a raw stdout line into a response, a notification, or noise.
///
/// Server-initiated requests (a `method` plus an `id`) are routed as
/// notifications: with approvals disabled the child should not ask anything,
/// and subscribers still see the payload verbatim.
pub fn classify(line: &str) -> Line {
    let trimmed = line.trim();
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Line::Unparsed(line.to_string());
    };
    let Some(obj) = value.as_object() else {
        return Line::Unparsed(line.to_string());
    };

    if obj.contains_key("method") {
        if let Ok(notification) = serde_json::from_value::<JsonRpcNotification>(value.clone()) {
            return Line::Notification(notification);
        }
        return Line::Unparsed(line.to_string());
    }

    if obj.contains_key("id") && (obj.contains_key("result") || obj.contains_key("error")) {
        if let Ok(response) = serde_json::from_value::<JsonRpcResponse>(value) {
            return Line::Response(response);
        }
    }

    Line::Unparsed(line.to_string())
}
