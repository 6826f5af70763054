//! JSON-RPC 2.0 envelope types.
//!
//! The daemon speaks plain JSON-RPC 2.0 with integer request ids. Outgoing
//! traffic is always a [`Request`]; incoming traffic is either a [`Response`]
//! correlated by id or an unsolicited [`Notification`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
}

impl Request {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A request built outside the client, e.g. from a JSON document typed by a user.
///
/// The `id` field exists only so that a caller-supplied id can be detected and
/// refused; ids are always assigned by [`RpcClient`](crate::RpcClient).
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Deserialize the `result` payload. A missing result is read as `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn parse_result<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.result.clone().unwrap_or(Value::Null))
    }
}

/// JSON-RPC 2.0 Notification (no id, no reply expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 Error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Message the daemon may send to the client.
#[derive(Debug, Clone)]
pub enum Message {
    Response(Response),
    Notification(Notification),
}

impl Message {
    /// Classify an already-parsed JSON document.
    ///
    /// Anything carrying a `method` is a notification; everything else must be
    /// a response with an integer id. The protocol version must be `"2.0"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has neither shape or the wrong version.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error;

        let message = if value.get("method").is_some() {
            Message::Notification(serde_json::from_value(value)?)
        } else {
            Message::Response(serde_json::from_value(value)?)
        };

        if message.version() != JSONRPC_VERSION {
            return Err(serde_json::Error::custom(format!(
                "unsupported jsonrpc version {:?}",
                message.version()
            )));
        }

        Ok(message)
    }

    #[must_use]
    pub fn version(&self) -> &str {
        match self {
            Message::Response(r) => &r.jsonrpc,
            Message::Notification(n) => &n.jsonrpc,
        }
    }
}
