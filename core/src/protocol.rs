//! Line protocol messages.
//!
//! Each line carries one JSON object. Requests are `{"tool": .., "args": {..}}`;
//! responses are either `{"result": ..}` or `{"error": ".."}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Line the server writes once on startup, before serving requests.
pub const READY_LINE: &str = "q2d_search server ready";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Request {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        Self { tool: tool.into(), args }
    }
}

// Error is tried first when decoding; a reply never carries both keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Error { error: String },
    Result { result: Value },
}

impl Response {
    pub fn ok(result: Value) -> Self { Response::Result { result } }
    pub fn err(message: impl Into<String>) -> Self { Response::Error { error: message.into() } }

    pub fn is_error(&self) -> bool { matches!(self, Response::Error { .. }) }

    pub fn into_result(self) -> Result<Value, String> {
        match self {
            Response::Result { result } => Ok(result),
            Response::Error { error } => Err(error),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
}

pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
