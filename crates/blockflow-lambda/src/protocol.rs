//! Messages exchanged with an evaluator. Both transports carry these as JSON.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use blockflow_core::id::RequestId;
use blockflow_core::types::Value;
use serde::{Deserialize, Serialize};

/// Function name every worker answers with an empty result; used by handshakes.
pub const PING_FUNCTION: &str = "__ping";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id, so clients and handshakes sharing a transport
/// never collide. Zero is never handed out.
pub fn next_request_id() -> RequestId {
    RequestId::new(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Each row is passed to the function as its argument list.
    Rows(Vec<Vec<Value>>),
    /// Each value is passed as a single argument.
    Values(Vec<Value>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Rows(r) => r.len(),
            Payload::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaRequest {
    pub id: RequestId,
    pub function: String,
    pub payload: Payload,
    /// Inputs containing an undefined value map to undefined without a call.
    #[serde(default)]
    pub skip_undefined: bool,
}

impl LambdaRequest {
    pub fn ping(id: RequestId) -> Self {
        Self {
            id,
            function: PING_FUNCTION.to_string(),
            payload: Payload::Values(Vec::new()),
            skip_undefined: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownFunction,
    UserError,
    Protocol,
    Timeout,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl LambdaFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for LambdaFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaResponse {
    pub id: RequestId,
    pub result: Result<Vec<Value>, LambdaFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let req = LambdaRequest {
            id: RequestId::new(7),
            function: "inc".into(),
            payload: Payload::Values(vec![Value::Integer(1)]),
            skip_undefined: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["payload"]["values"][0]["Integer"], 1);

        let back: LambdaRequest =
            serde_json::from_str(r#"{"id":7,"function":"inc","payload":{"rows":[]}}"#).unwrap();
        assert!(!back.skip_undefined);
        assert!(back.payload.is_empty());
    }

    #[test]
    fn failure_response_shape() {
        let resp = LambdaResponse {
            id: RequestId::new(1),
            result: Err(LambdaFailure::new(FailureKind::UnknownFunction, "nope")),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["Err"]["kind"], "unknown_function");
    }
}
