use thiserror::Error;

use crate::transport::Encoding;

/// Top-level error type for the `xenly-api` crate.
///
/// Only covers failures to complete an exchange. A remote fault is not an
/// error at this layer: it comes back as [`RpcResult::Fault`](crate::RpcResult)
/// and is translated by [`XapiError::wrap`](crate::XapiError::wrap) one layer up.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered, but not in the requested encoding.
    ///
    /// This is the only variant that triggers an encoding fallback.
    #[error("Endpoint does not speak {encoding}: {reason}")]
    UnsupportedTransport { encoding: Encoding, reason: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Unexpected HTTP status from an endpoint that otherwise speaks the encoding.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Response body could not be decoded, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Request parameters could not be encoded.
    #[error("Cannot encode request: {0}")]
    Encode(String),
}

impl Error {
    /// Returns `true` if retrying with the legacy encoding might succeed.
    pub fn is_unsupported_transport(&self) -> bool {
        matches!(self, Self::UnsupportedTransport { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Classify a `reqwest` send failure.
    pub(crate) fn from_send(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unsupported_transport_triggers_fallback() {
        let unsupported = Error::UnsupportedTransport {
            encoding: Encoding::JsonRpc,
            reason: "HTTP 404".into(),
        };
        assert!(unsupported.is_unsupported_transport());
        assert!(!Error::Timeout { timeout_secs: 5 }.is_unsupported_transport());
        assert!(
            !Error::Http {
                status: 500,
                body: String::new()
            }
            .is_unsupported_transport()
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(
            Error::Http {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !Error::Http {
                status: 403,
                body: String::new()
            }
            .is_transient()
        );
        assert!(Error::Timeout { timeout_secs: 1 }.is_transient());
    }
}
