// Shared helpers for xenly-core integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use xenly_core::{Connection, ConnectionConfig, Credentials};

/// Matches a JSON-RPC request by method name.
pub struct RpcMethod(pub String);

impl Match for RpcMethod {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get("method")?.as_str().map(|m| m == self.0.as_str()))
            .unwrap_or(false)
    }
}

/// Matches a JSON-RPC request whose positional parameter `.0` equals `.1`.
pub struct RpcParam(pub usize, pub Value);

impl Match for RpcParam {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get("params")?.get(self.0).cloned())
            .is_some_and(|param| param == self.1)
    }
}

pub fn rpc(name: &str) -> wiremock::MockBuilder {
    Mock::given(method("POST"))
        .and(path("/jsonrpc"))
        .and(RpcMethod(name.to_owned()))
}

pub fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": 0
    }))
}

pub fn fault(code: &str, params: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "error": {"code": 1, "message": code, "data": params},
        "id": 0
    }))
}

pub fn config(server: &MockServer) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(
        Url::parse(&server.uri()).unwrap(),
        Credentials::new("root", "secret"),
    );
    config.watch_events = false;
    config
}

/// Mount a login that always hands out `token`.
pub async fn mount_login(server: &MockServer, token: &str) {
    rpc("session.login_with_password")
        .respond_with(ok(json!(token)))
        .mount(server)
        .await;
}

pub async fn connected(server: &MockServer) -> Connection {
    mount_login(server, "OpaqueRef:session").await;
    let conn = Connection::new(config(server)).unwrap();
    conn.connect().await.unwrap();
    conn
}

/// Number of JSON-RPC requests received for `name`.
pub async fn calls_to(server: &MockServer, name: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| RpcMethod(name.to_owned()).matches(r))
        .count()
}
