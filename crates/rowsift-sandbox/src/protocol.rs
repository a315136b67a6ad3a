//! Messages exchanged between the evaluator client and the sandbox.
//!
//! Every envelope is a JSON object discriminated by `type`:
//!
//! | type                 | direction        | payload                          |
//! |----------------------|------------------|----------------------------------|
//! | `SANDBOX_READY`      | sandbox → client | none, sent once after start-up   |
//! | `EVAL_EXPR_REQUEST`  | client → sandbox | `id`, `expr`, `context`          |
//! | `EVAL_EXPR_RESPONSE` | sandbox → client | `id`, `success`, `result`/`error`|
//!
//! The channel carries untyped JSON; receivers decode with
//! [`SandboxMessage::from_json`] and drop anything that does not decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

pub const SANDBOX_READY: &str = "SANDBOX_READY";
pub const EVAL_EXPR_REQUEST: &str = "EVAL_EXPR_REQUEST";
pub const EVAL_EXPR_RESPONSE: &str = "EVAL_EXPR_RESPONSE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SandboxMessage {
    #[serde(rename = "SANDBOX_READY")]
    Ready,
    #[serde(rename = "EVAL_EXPR_REQUEST")]
    Request(EvalRequest),
    #[serde(rename = "EVAL_EXPR_RESPONSE")]
    Response(EvalResponse),
}

impl SandboxMessage {
    pub fn from_json(value: JsonValue) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    pub id: u64,
    pub expr: String,
    /// Variable name → value, bound as free identifiers.
    #[serde(default)]
    pub context: JsonMap<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub id: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalResponse {
    pub fn ok(id: u64, result: JsonValue) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }

    /// The evaluated value, or the sandbox's error message.
    ///
    /// A successful response without `result` (or with `result: null`) is a
    /// null value.
    pub fn into_result(self) -> Result<JsonValue, String> {
        if self.success {
            Ok(self.result.unwrap_or(JsonValue::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "evaluation failed without a message".to_string()))
        }
    }
}

impl From<EvalRequest> for SandboxMessage {
    fn from(request: EvalRequest) -> Self {
        SandboxMessage::Request(request)
    }
}

impl From<EvalResponse> for SandboxMessage {
    fn from(response: EvalResponse) -> Self {
        SandboxMessage::Response(response)
    }
}
