//! JSON-RPC notifications carried by the event stream

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON-RPC protocol version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Notification method names
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Stopped,
    Continued,
    Terminated,
    Module,
}

/// `{"jsonrpc":"2.0","method":...,"params":{...}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: NotificationMethod,
    pub params: Map<String, Value>,
}

impl Notification {
    pub fn new(method: NotificationMethod, params: Map<String, Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method,
            params,
        }
    }

    /// Build from a `json!` value; anything but an object becomes `{}`
    pub fn with_value(method: NotificationMethod, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(method, params)
    }

    /// Server-Sent-Events record: `data: <json>\n\n`
    pub fn to_sse_event(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
