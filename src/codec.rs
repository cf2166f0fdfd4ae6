//! JSON-RPC 2.0 message codec (C1).
//!
//! Encodes the three MCP message variants with the literal field
//! `"jsonrpc":"2.0"` and decodes incoming `serde_json::Value`s into the
//! correct variant using the disambiguation rule from the spec. Stateless
//! and reentrant — every function here is a pure transform.

use serde_json::{json, Map, Value};

use crate::error::ClientError;

const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request or response id. The spec allows string or integer;
/// this closed enum makes that the only two representable shapes instead of
/// accepting whatever `serde_json::Value` allows (floats, bools, null).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Str(String),
    Num(i64),
}

impl RequestId {
    fn from_value(v: &Value) -> Result<Self, ClientError> {
        match v {
            Value::String(s) => Ok(RequestId::Str(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(RequestId::Num)
                .ok_or_else(|| ClientError::protocol("request id is not an integer or string")),
            _ => Err(ClientError::protocol("request id is not an integer or string")),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Str(s) => Value::String(s.clone()),
            RequestId::Num(n) => json!(n),
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Str(s) => write!(f, "{s}"),
            RequestId::Num(n) => write!(f, "{n}"),
        }
    }
}

/// A JSON-RPC 2.0 error object. `data` is preserved opaquely.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// The three tagged variants a decoded JSON-RPC message can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: RequestId,
        result: Option<Value>,
        error: Option<RpcError>,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response_ok(id: RequestId, result: Value) -> Self {
        Message::Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn response_err(id: RequestId, error: RpcError) -> Self {
        Message::Response {
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Encode a [`Message`] into the wire `serde_json::Value`.
pub fn encode(msg: &Message) -> Value {
    match msg {
        Message::Request { id, method, params } => {
            let mut obj = Map::new();
            obj.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
            obj.insert("id".into(), id.to_value());
            obj.insert("method".into(), json!(method));
            if let Some(p) = params {
                obj.insert("params".into(), p.clone());
            }
            Value::Object(obj)
        }
        Message::Notification { method, params } => {
            let mut obj = Map::new();
            obj.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
            obj.insert("method".into(), json!(method));
            if let Some(p) = params {
                obj.insert("params".into(), p.clone());
            }
            Value::Object(obj)
        }
        Message::Response { id, result, error } => {
            let mut obj = Map::new();
            obj.insert("jsonrpc".into(), json!(JSONRPC_VERSION));
            obj.insert("id".into(), id.to_value());
            if let Some(r) = result {
                obj.insert("result".into(), r.clone());
            }
            if let Some(e) = error {
                let mut eobj = Map::new();
                eobj.insert("code".into(), json!(e.code));
                eobj.insert("message".into(), json!(e.message));
                if let Some(d) = &e.data {
                    eobj.insert("data".into(), d.clone());
                }
                obj.insert("error".into(), Value::Object(eobj));
            }
            Value::Object(obj)
        }
    }
}

/// Decode a wire `serde_json::Value` into a [`Message`], applying the
/// disambiguation rule in order:
///
/// 1. `id` present and (`result` or `error`) present -> Response.
/// 2. `id` present and `method` present -> Request.
/// 3. `id` absent and `method` present -> Notification.
/// 4. Otherwise -> `ProtocolError`.
pub fn decode(value: &Value) -> Result<Message, ClientError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ClientError::protocol("malformed message: not a JSON object"))?;

    let id = obj.get("id");
    let method = obj.get("method").and_then(Value::as_str);
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if let Some(id_value) = id {
        if has_result || has_error {
            if has_result && has_error {
                return Err(ClientError::protocol(
                    "malformed message: response has both result and error",
                ));
            }
            let id = RequestId::from_value(id_value)?;
            let result = obj.get("result").cloned();
            let error = if has_error {
                Some(decode_rpc_error(obj.get("error").unwrap())?)
            } else {
                None
            };
            return Ok(Message::Response { id, result, error });
        }
        if let Some(method) = method {
            let id = RequestId::from_value(id_value)?;
            return Ok(Message::Request {
                id,
                method: method.to_string(),
                params: obj.get("params").cloned(),
            });
        }
        return Err(ClientError::protocol("malformed message"));
    }

    if let Some(method) = method {
        return Ok(Message::Notification {
            method: method.to_string(),
            params: obj.get("params").cloned(),
        });
    }

    Err(ClientError::protocol("malformed message"))
}

fn decode_rpc_error(v: &Value) -> Result<RpcError, ClientError> {
    let code = v
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| ClientError::protocol("malformed error object: code must be an integer"))?
        as i32;
    let message = v
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::protocol("malformed error object: message must be a string"))?
        .to_string();
    let data = v.get("data").cloned();
    Ok(RpcError { code, message, data })
}
