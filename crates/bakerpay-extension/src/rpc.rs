// JSON-RPC 2.0 wire types for the extension protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";
/// Benign: the extension does not implement the hook.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Lifecycle notification sent before an extension is closed.
pub const CLOSE_METHOD: &str = "close";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    /// A notification carries no id and expects no response.
    pub fn notification(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params: Some(params),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn is_method_not_found(&self) -> bool {
        self.error
            .as_ref()
            .map(|e| e.code == METHOD_NOT_FOUND)
            .unwrap_or(false)
    }
}

/// Envelope carried by every hook invocation.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HookPayload {
    pub version: String,
    pub data: Value,
}
