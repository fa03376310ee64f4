// JSON-RPC encoding
//
// The primary wire format: `POST {base}/jsonrpc` with a JSON-RPC 2.0
// envelope. Calls are never pipelined, so the id is always 0.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Error;
use crate::message::{RpcRequest, RpcResult};
use crate::transport::Encoding;

/// Path of the JSON-RPC endpoint, relative to the host root.
pub const PATH: &str = "jsonrpc";

pub const CONTENT_TYPE: &str = "application/json";

const VERSION: &str = "2.0";
const CALL_ID: u64 = 0;

#[derive(Deserialize)]
struct WireRequest {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

pub fn encode_request(request: &RpcRequest) -> Result<String, Error> {
    serde_json::to_string(&json!({
        "jsonrpc": VERSION,
        "method": request.method,
        "params": request.params,
        "id": CALL_ID,
    }))
    .map_err(|e| Error::Encode(e.to_string()))
}

pub fn decode_request(body: &str) -> Result<RpcRequest, Error> {
    let wire: WireRequest =
        serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.to_owned(),
        })?;
    Ok(RpcRequest::new(wire.method, wire.params))
}

pub fn encode_response(result: &RpcResult) -> String {
    let envelope = match result {
        RpcResult::Success(value) => json!({ "jsonrpc": VERSION, "result": value, "id": CALL_ID }),
        RpcResult::Fault(payload) => json!({ "jsonrpc": VERSION, "error": payload, "id": CALL_ID }),
    };
    envelope.to_string()
}

/// Decode a response body.
///
/// A body that is not a JSON-RPC response at all means the endpoint does
/// not speak this encoding, which is reported as
/// [`Error::UnsupportedTransport`] so the session layer can fall back.
pub fn decode_response(body: &str) -> Result<RpcResult, Error> {
    let unsupported = |reason: String| Error::UnsupportedTransport {
        encoding: Encoding::JsonRpc,
        reason,
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| unsupported(format!("body is not JSON: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(unsupported("response is not a JSON object".into()));
    };

    match map.remove("error") {
        Some(Value::Null) | None => {}
        Some(payload) => return Ok(RpcResult::Fault(payload)),
    }

    map.remove("result")
        .map(RpcResult::Success)
        .ok_or_else(|| unsupported("response has neither `result` nor `error`".into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let req = RpcRequest::new("VM.get_all", vec![json!("OpaqueRef:session")]);
        let encoded: Value = serde_json::from_str(&encode_request(&req).unwrap()).unwrap();
        assert_eq!(
            encoded,
            json!({
                "jsonrpc": "2.0",
                "method": "VM.get_all",
                "params": ["OpaqueRef:session"],
                "id": 0
            })
        );
    }

    #[test]
    fn request_round_trip() {
        let requests = [
            RpcRequest::new("session.logout", vec![]),
            RpcRequest::new(
                "network.create",
                vec![
                    json!("OpaqueRef:s"),
                    json!({"name_label": "lan", "MTU": 1500, "other_config": {}}),
                ],
            ),
            RpcRequest::new("event.from", vec![json!("s"), json!(["VM"]), json!(""), json!(60.0)]),
        ];
        for req in requests {
            let decoded = decode_request(&encode_request(&req).unwrap()).unwrap();
            assert_eq!(decoded, req);
        }
    }

    #[test]
    fn response_round_trip() {
        let responses = [
            RpcResult::Success(json!("OpaqueRef:1")),
            RpcResult::Success(json!(null)),
            RpcResult::Success(json!({"token": "1.2", "events": []})),
            RpcResult::Fault(json!({"code": "HANDLE_INVALID", "params": ["VM", "x"]})),
        ];
        for resp in responses {
            assert_eq!(decode_response(&encode_response(&resp)).unwrap(), resp);
        }
    }

    #[test]
    fn null_error_is_success() {
        let resp = decode_response(r#"{"result": 3, "error": null, "id": 0}"#).unwrap();
        assert_eq!(resp, RpcResult::Success(json!(3)));
    }

    #[test]
    fn non_json_body_is_unsupported() {
        let err = decode_response("<?xml version=\"1.0\"?><methodResponse/>").unwrap_err();
        assert!(err.is_unsupported_transport());
    }

    #[test]
    fn json_without_envelope_is_unsupported() {
        assert!(decode_response("[1, 2]").unwrap_err().is_unsupported_transport());
        assert!(decode_response(r#"{"id": 0}"#).unwrap_err().is_unsupported_transport());
    }
}
