// Remote fault translation
//
// XAPI reports failures as a code plus a list of string parameters. The
// shape differs by encoding and server version; `XapiError::wrap` accepts
// all of them and never fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Code used when a fault payload has no recognizable shape.
pub const UNKNOWN_FAULT: &str = "UnknownFault";

pub const SESSION_INVALID: &str = "SESSION_INVALID";
pub const SESSION_AUTHENTICATION_FAILED: &str = "SESSION_AUTHENTICATION_FAILED";
pub const HOST_IS_SLAVE: &str = "HOST_IS_SLAVE";
pub const EVENTS_LOST: &str = "EVENTS_LOST";
pub const EVENT_FROM_TOKEN_PARSE_FAILURE: &str = "EVENT_FROM_TOKEN_PARSE_FAILURE";
pub const SESSION_NOT_REGISTERED: &str = "SESSION_NOT_REGISTERED";
pub const HANDLE_INVALID: &str = "HANDLE_INVALID";
pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
pub const MESSAGE_METHOD_UNKNOWN: &str = "MESSAGE_METHOD_UNKNOWN";

/// A structured remote fault.
///
/// `code` is the remote error code verbatim (e.g. `"HANDLE_INVALID"`) and
/// `params` its arguments in the order the host sent them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XapiError {
    pub code: String,
    pub params: Vec<String>,
    /// Method of the call that produced the fault, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl XapiError {
    pub fn new(code: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            code: code.into(),
            params,
            method: None,
        }
    }

    /// Translate a raw fault payload into a structured error.
    ///
    /// Accepted shapes:
    /// - `{"code": "X", "params": [..]}`
    /// - `{"message": "X", "data": [..]}` (XAPI JSON-RPC 2.0)
    /// - `["X", ..]` (XML-RPC `ErrorDescription`)
    /// - `{"faultCode": N, "faultString": "X"}` (classic XML-RPC fault, with
    ///   the numeric code kept as the single parameter)
    ///
    /// Anything else yields [`UNKNOWN_FAULT`] with the raw payload as the
    /// single parameter.
    pub fn wrap(payload: &Value) -> Self {
        match payload {
            Value::Object(map) => {
                if let Some(Value::String(code)) = map.get("code") {
                    return Self::new(code.clone(), params_of(map.get("params")));
                }
                if let Some(Value::String(code)) = map.get("message") {
                    return Self::new(code.clone(), params_of(map.get("data")));
                }
                if let Some(Value::String(code)) = map.get("faultString") {
                    let params = map.get("faultCode").map(stringify).into_iter().collect();
                    return Self::new(code.clone(), params);
                }
                Self::unknown(payload)
            }
            Value::Array(items) => match items.split_first() {
                Some((Value::String(code), rest)) => {
                    Self::new(code.clone(), rest.iter().map(stringify).collect())
                }
                _ => Self::unknown(payload),
            },
            _ => Self::unknown(payload),
        }
    }

    fn unknown(payload: &Value) -> Self {
        Self::new(UNKNOWN_FAULT, vec![payload.to_string()])
    }

    /// Attach the method name of the failing call.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// The session token was expired or revoked by the host.
    pub fn is_session_invalid(&self) -> bool {
        self.is(SESSION_INVALID)
    }

    /// The event-feed cursor is no longer usable and a full resync is due.
    pub fn is_cursor_invalid(&self) -> bool {
        matches!(
            self.code.as_str(),
            EVENTS_LOST | EVENT_FROM_TOKEN_PARSE_FAILURE | SESSION_NOT_REGISTERED
        )
    }

    pub fn is_authentication_failure(&self) -> bool {
        self.is(SESSION_AUTHENTICATION_FAILED)
    }

    /// For `HOST_IS_SLAVE`, the address of the pool master.
    pub fn master_address(&self) -> Option<&str> {
        if self.is(HOST_IS_SLAVE) {
            self.params.first().map(String::as_str)
        } else {
            None
        }
    }
}

impl fmt::Display for XapiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.code, self.params.join(", "))?;
        if let Some(ref method) = self.method {
            write!(f, " in {method}")?;
        }
        Ok(())
    }
}

impl std::error::Error for XapiError {}

fn params_of(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(stringify).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![stringify(other)],
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn wraps_modern_shape() {
        let err = XapiError::wrap(&json!({
            "code": "HANDLE_INVALID",
            "params": ["VM", "OpaqueRef:1234"]
        }));
        assert_eq!(err.code, "HANDLE_INVALID");
        assert_eq!(err.params, vec!["VM", "OpaqueRef:1234"]);
    }

    #[test]
    fn wraps_jsonrpc2_shape() {
        let err = XapiError::wrap(&json!({
            "code": 1,
            "message": "SESSION_INVALID",
            "data": ["OpaqueRef:abc"]
        }));
        assert!(err.is_session_invalid());
        assert_eq!(err.params, vec!["OpaqueRef:abc"]);
    }

    #[test]
    fn wraps_error_description_array() {
        let err = XapiError::wrap(&json!(["HOST_IS_SLAVE", "10.0.0.2"]));
        assert_eq!(err.master_address(), Some("10.0.0.2"));
    }

    #[test]
    fn wraps_classic_xmlrpc_fault() {
        let err = XapiError::wrap(&json!({"faultCode": -1, "faultString": "boom"}));
        assert_eq!(err.code, "boom");
        assert_eq!(err.params, vec!["-1"]);

        let err = XapiError::wrap(&json!({"faultString": "MESSAGE_METHOD_UNKNOWN"}));
        assert!(err.is(MESSAGE_METHOD_UNKNOWN));
        assert!(err.params.is_empty());
    }

    #[test]
    fn stringifies_non_string_params() {
        let err = XapiError::wrap(&json!({"code": "VALUE_TOO_LARGE", "params": [42, true]}));
        assert_eq!(err.params, vec!["42", "true"]);
    }

    #[test]
    fn missing_params_yield_empty_list() {
        let err = XapiError::wrap(&json!({"code": "PERMISSION_DENIED"}));
        assert!(err.params.is_empty());
    }

    #[test]
    fn malformed_payloads_become_unknown_fault() {
        for payload in [json!(null), json!(17), json!({"nope": 1}), json!([]), json!([3, "x"])] {
            let err = XapiError::wrap(&payload);
            assert_eq!(err.code, UNKNOWN_FAULT, "payload {payload}");
            assert_eq!(err.params, vec![payload.to_string()]);
        }
    }

    #[test]
    fn cursor_invalid_codes() {
        for code in [EVENTS_LOST, EVENT_FROM_TOKEN_PARSE_FAILURE, SESSION_NOT_REGISTERED] {
            assert!(XapiError::new(code, vec![]).is_cursor_invalid());
        }
        assert!(!XapiError::new(SESSION_INVALID, vec![]).is_cursor_invalid());
    }

    #[test]
    fn display_includes_method() {
        let err = XapiError::new("HANDLE_INVALID", vec!["VM".into(), "OpaqueRef:x".into()])
            .with_method("VM.start");
        assert_eq!(err.to_string(), "HANDLE_INVALID(VM, OpaqueRef:x) in VM.start");
    }
}
