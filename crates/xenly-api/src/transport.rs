// HTTP transport for XAPI calls.
//
// Builds the `reqwest::Client` once from a `TransportConfig` (TLS, timeout,
// connection pooling) and sends one encoded call per request. Encoding
// selection belongs to the session layer; this module only does what it
// is told.

use std::fmt;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::message::{RpcRequest, RpcResult};
use crate::{jsonrpc, xmlrpc};

/// Statuses meaning "this path exists in no form that speaks the encoding".
const UNSUPPORTED_STATUSES: [StatusCode; 4] = [
    StatusCode::NOT_FOUND,
    StatusCode::METHOD_NOT_ALLOWED,
    StatusCode::UNSUPPORTED_MEDIA_TYPE,
    StatusCode::NOT_IMPLEMENTED,
];

/// Wire encoding of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// JSON-RPC 2.0 at `/jsonrpc` (primary).
    JsonRpc,
    /// XML-RPC at `/` (hosts that predate JSON-RPC).
    XmlRpc,
}

impl Encoding {
    pub fn path(self) -> &'static str {
        match self {
            Self::JsonRpc => jsonrpc::PATH,
            Self::XmlRpc => xmlrpc::PATH,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::JsonRpc => jsonrpc::CONTENT_TYPE,
            Self::XmlRpc => xmlrpc::CONTENT_TYPE,
        }
    }

    pub fn encode_request(self, request: &RpcRequest) -> Result<String, Error> {
        match self {
            Self::JsonRpc => jsonrpc::encode_request(request),
            Self::XmlRpc => Ok(xmlrpc::encode_request(request)),
        }
    }

    pub fn decode_response(self, body: &str) -> Result<RpcResult, Error> {
        match self {
            Self::JsonRpc => jsonrpc::decode_response(body),
            Self::XmlRpc => xmlrpc::decode_response(body),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JsonRpc => "JSON-RPC",
            Self::XmlRpc => "XML-RPC",
        })
    }
}

// ── Configuration ────────────────────────────────────────────────────

/// TLS verification mode (api-level mirror of core's `TlsVerification`).
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (hosts ship with self-signed certificates).
    DangerAcceptInvalid,
}

/// Outbound connection-pool tuning, passed straight to `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    pub max_idle_per_host: Option<usize>,
    pub idle_timeout: Option<Duration>,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Default per-request timeout. Long polls override it per call.
    pub timeout: Duration,
    pub pool: PoolConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No client-wide timeout is set; every request carries its own so the
    /// event long-poll can outlive ordinary calls.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/xml"));

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("xenly/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(max) = self.pool.max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max);
        }
        if let Some(idle) = self.pool.idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

// ── Transport ────────────────────────────────────────────────────────

/// Sends encoded calls to one host.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference-counted,
/// so a redirected transport ([`with_host`](Self::with_host)) shares the
/// connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl Transport {
    /// Create a transport for `base_url` (e.g. `https://xcp-host`).
    pub fn new(base_url: Url, config: &TransportConfig) -> Result<Self, Error> {
        let http = config.build_client()?;
        Ok(Self::with_client(http, base_url, config.timeout))
    }

    /// Create a transport with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url: root_of(base_url),
            timeout,
        }
    }

    /// The host root all encodings are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Same transport aimed at another host (e.g. the pool master).
    ///
    /// `host` may carry a port (`"10.0.0.2:8443"`); scheme is preserved.
    /// A bare IPv6 literal (`"fd00::1"`) is bracketed before parsing.
    pub fn with_host(&self, host: &str) -> Result<Self, Error> {
        let authority = if host.parse::<Ipv6Addr>().is_ok() {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        let url = Url::parse(&format!("{}://{authority}/", self.base_url.scheme()))?;
        Ok(Self {
            http: self.http.clone(),
            base_url: url,
            timeout: self.timeout,
        })
    }

    /// Full endpoint URL for an encoding.
    pub fn endpoint(&self, encoding: Encoding) -> Result<Url, Error> {
        Ok(self.base_url.join(encoding.path())?)
    }

    /// Send one call with the default timeout.
    pub async fn send(
        &self,
        encoding: Encoding,
        method: &str,
        params: &[Value],
    ) -> Result<RpcResult, Error> {
        self.send_with_timeout(encoding, method, params, self.timeout)
            .await
    }

    /// Send one call, waiting at most `timeout` for the response.
    ///
    /// Remote faults are returned as [`RpcResult::Fault`]. Errors are
    /// reserved for exchanges that could not complete or be decoded.
    pub async fn send_with_timeout(
        &self,
        encoding: Encoding,
        method: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<RpcResult, Error> {
        let url = self.endpoint(encoding)?;
        let request = RpcRequest::new(method, params.to_vec());
        let body = encoding.encode_request(&request)?;

        debug!(%encoding, method, "POST {}", url);

        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, encoding.content_type())
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::from_send(e, timeout.as_secs()))?;

        let status = resp.status();
        if UNSUPPORTED_STATUSES.contains(&status) {
            return Err(Error::UnsupportedTransport {
                encoding,
                reason: format!("HTTP {status}"),
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| Error::from_send(e, timeout.as_secs()))?;

        if !status.is_success() {
            // XAPI answers faults with 200; anything else that still decodes
            // as a response is worth keeping, otherwise report the status.
            return encoding.decode_response(&text).map_err(|_| Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        trace!(%encoding, method, body = %text, "response body");
        encoding.decode_response(&text)
    }
}

/// Strip path, query and fragment: both endpoints live at the host root.
fn root_of(mut url: Url) -> Url {
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn transport(url: &str) -> Transport {
        Transport::with_client(
            reqwest::Client::new(),
            Url::parse(url).unwrap(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn endpoints_resolve_against_host_root() {
        let t = transport("https://xcp.example/some/path?x=1");
        assert_eq!(
            t.endpoint(Encoding::JsonRpc).unwrap().as_str(),
            "https://xcp.example/jsonrpc"
        );
        assert_eq!(
            t.endpoint(Encoding::XmlRpc).unwrap().as_str(),
            "https://xcp.example/"
        );
    }

    #[test]
    fn with_host_keeps_scheme_and_timeout() {
        let t = transport("https://slave.example:8443");
        let master = t.with_host("10.0.0.1:443").unwrap();
        assert_eq!(master.base_url().as_str(), "https://10.0.0.1/");
        assert_eq!(master.timeout(), Duration::from_secs(5));

        let plain = transport("http://slave.example").with_host("master.example").unwrap();
        assert_eq!(
            plain.endpoint(Encoding::JsonRpc).unwrap().as_str(),
            "http://master.example/jsonrpc"
        );
    }

    #[test]
    fn with_host_brackets_ipv6_literals() {
        let t = transport("https://slave.example");
        assert_eq!(
            t.with_host("fd00::1").unwrap().endpoint(Encoding::JsonRpc).unwrap().as_str(),
            "https://[fd00::1]/jsonrpc"
        );
        assert_eq!(
            t.with_host("[fd00::2]:8443").unwrap().base_url().as_str(),
            "https://[fd00::2]:8443/"
        );
    }

    #[test]
    fn default_config_builds() {
        assert!(TransportConfig::default().build_client().is_ok());
    }

    #[test]
    fn encoding_display() {
        assert_eq!(Encoding::JsonRpc.to_string(), "JSON-RPC");
        assert_eq!(Encoding::XmlRpc.to_string(), "XML-RPC");
    }
}
