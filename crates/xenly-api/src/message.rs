// Encoding-neutral RPC messages
//
// Both wire encodings decode into these types, so nothing above the
// transport can tell which one carried a call.

use serde_json::Value;

/// One remote-procedure call: method name plus positional parameters.
///
/// The session token, when needed, is the first parameter. The transport
/// does not know or care.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Outcome of a completed exchange.
///
/// A remote fault is data, not an error: the transport parsed the response
/// fine, the host just said no.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResult {
    Success(Value),
    Fault(Value),
}

impl RpcResult {
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Convert into a `Result`, translating the fault payload.
    pub fn into_result(self) -> Result<Value, crate::XapiError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Fault(payload) => Err(crate::XapiError::wrap(&payload)),
        }
    }
}
