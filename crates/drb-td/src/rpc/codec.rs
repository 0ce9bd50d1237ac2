//! JSON-RPC 2.0 envelope encoding and decoding.
//!
//! Pure functions only. Requests are serialized with serde; replies are read
//! field by field from a `serde_json::Value` so that `"result": null` stays
//! distinguishable from an absent `result`.
//!
//! Deribit replies look like:
//!
//! ```json
//! {"jsonrpc":"2.0","id":"6f1c…","result":{…},
//!  "usIn":1700000000000000,"usOut":1700000000000420,"usDiff":420,"testnet":true}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use drb_core::error::{DrbError, DrbResult};
use drb_core::json_util::parse_str_u64;

/// Request params: a JSON object.
pub type Params = Map<String, Value>;

/// Fresh correlation id for one request.
pub fn next_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    id: &'a str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Params>,
}

/// Encode a request. `params` is left out entirely when absent or empty.
pub fn encode(id: &str, method: &str, params: Option<&Params>) -> String {
    let envelope = RequestEnvelope {
        jsonrpc: "2.0",
        id,
        method,
        params: params.filter(|p| !p.is_empty()),
    };
    // A struct of strings and a JSON map always serializes.
    serde_json::to_string(&envelope).unwrap_or_default()
}

/// The `error` object of a failed reply.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// A decoded frame: either a reply (`id` set) or a notification (`method` set).
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: Option<String>,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
    /// Notification method (`subscription`, `heartbeat`, ...).
    pub method: Option<String>,
    pub params: Option<Value>,
    /// Exchange receive timestamp (µs).
    pub us_in: Option<u64>,
    /// Exchange send timestamp (µs).
    pub us_out: Option<u64>,
    /// Exchange-side processing time (µs).
    pub us_diff: Option<u64>,
    pub testnet: Option<bool>,
}

impl RpcResponse {
    pub fn is_reply(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Convert an error reply into [`DrbError::Rpc`] tagged with `method`.
    pub fn into_result(self, method: &str) -> DrbResult<RpcResponse> {
        match self.error {
            Some(ref err) => Err(DrbError::Rpc {
                method: method.to_string(),
                id: self.id.clone().unwrap_or_default(),
                code: err.code,
                message: err.message.clone(),
            }),
            None => Ok(self),
        }
    }

    /// The `result` value, or [`DrbError::MissingField`].
    pub fn result(&self) -> DrbResult<&Value> {
        self.result.as_ref().ok_or_else(|| DrbError::MissingField("result".into()))
    }
}

/// Decode one frame.
pub fn decode(text: &str) -> DrbResult<RpcResponse> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DrbError::MalformedMessage(format!("invalid JSON: {e}")))?;
    let Value::Object(mut obj) = value else {
        return Err(DrbError::MalformedMessage("frame is not a JSON object".into()));
    };

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(DrbError::MalformedMessage(format!("unsupported id type: {other}")));
        }
    };
    let result = obj.remove("result");
    let error = match obj.remove("error") {
        None => None,
        Some(err) => Some(decode_error(&err)?),
    };
    let method = obj.get("method").and_then(Value::as_str).map(str::to_string);

    match (&id, &result, &error) {
        (Some(id), None, None) => {
            let reason = format!("reply {id} has neither result nor error");
            return Err(DrbError::MalformedMessage(reason));
        }
        (Some(id), Some(_), Some(_)) => {
            return Err(DrbError::MalformedMessage(format!("reply {id} has both result and error")));
        }
        (None, _, None) if method.is_none() => {
            return Err(DrbError::MalformedMessage("frame has neither id nor method".into()));
        }
        _ => {}
    }

    Ok(RpcResponse {
        id,
        result,
        error,
        method,
        params: obj.remove("params"),
        us_in: parse_str_u64(obj.get("usIn")),
        us_out: parse_str_u64(obj.get("usOut")),
        us_diff: parse_str_u64(obj.get("usDiff")),
        testnet: obj.get("testnet").and_then(Value::as_bool),
    })
}

fn decode_error(err: &Value) -> DrbResult<RpcErrorBody> {
    let code = err
        .get("code")
        .and_then(Value::as_i64)
        .ok_or_else(|| DrbError::MalformedMessage(format!("error object without code: {err}")))?;
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .ok_or_else(|| DrbError::MalformedMessage(format!("error object without message: {err}")))?
        .to_string();
    Ok(RpcErrorBody {
        code,
        message,
        data: err.get("data").cloned(),
    })
}
