// ── Core error types ──
//
// User-facing errors from xenly-core. Transport details are folded into
// a few connection-level variants by `From<xenly_api::Error>`; remote
// faults pass through verbatim as `Fault`.

use thiserror::Error;
use xenly_api::XapiError;

use crate::model::SchemaError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(XapiError),

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Remote faults ────────────────────────────────────────────────
    #[error("{0}")]
    Fault(XapiError),

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Schema mismatch: {0}")]
    Schema(#[from] SchemaError),

    #[error("Unexpected result from {method}: {message}")]
    UnexpectedResult { method: String, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            message: message.into(),
        }
    }

    /// The remote fault, if this error is one.
    pub fn fault(&self) -> Option<&XapiError> {
        match self {
            Self::Fault(f) | Self::AuthenticationFailed(f) => Some(f),
            _ => None,
        }
    }

    /// Network-level failure worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Protocol { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xenly_api::Error> for CoreError {
    fn from(err: xenly_api::Error) -> Self {
        match err {
            xenly_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                }
            }
            xenly_api::Error::UnsupportedTransport { encoding, reason } => CoreError::Protocol {
                message: format!("host does not speak {encoding}: {reason}"),
            },
            xenly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            xenly_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            xenly_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            xenly_api::Error::Http { status, body } => CoreError::Http {
                status,
                message: body,
            },
            xenly_api::Error::Deserialization { message, body: _ } => {
                CoreError::Protocol { message }
            }
            xenly_api::Error::Encode(message) => {
                CoreError::Internal(format!("cannot encode request: {message}"))
            }
        }
    }
}
