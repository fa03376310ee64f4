//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use xenly_config::ConfigError;
use xenly_core::{CoreError, XapiError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(xenly::connection_failed),
        help(
            "Check that the host is running and reachable.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection lost: {reason}")]
    #[diagnostic(code(xenly::disconnected))]
    Disconnected { reason: String },

    #[error("Host sent an unexpected response: {message}")]
    #[diagnostic(
        code(xenly::protocol),
        help("The URL may not point at a XAPI host.")
    )]
    Protocol { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {fault}")]
    #[diagnostic(
        code(xenly::auth_failed),
        help(
            "Verify the username and password for profile '{profile}'.\n\
             Store a password with: xenly config set-password --profile {profile}"
        )
    )]
    AuthFailed { profile: String, fault: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(xenly::no_credentials),
        help(
            "Set XENLY_PASSWORD, store one with `xenly config set-password`,\n\
             or add `password` to the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Remote faults ────────────────────────────────────────────────
    #[error("{code}({params})")]
    #[diagnostic(code(xenly::fault), help("{help}"))]
    Fault {
        code: String,
        params: String,
        help: String,
    },

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(xenly::not_found),
        help("Run: xenly {list_command} to see available objects")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("API error: {message}")]
    #[diagnostic(code(xenly::api_error))]
    ApiError { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(xenly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(xenly::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No host configured")]
    #[diagnostic(
        code(xenly::no_config),
        help(
            "Pass --url, set XENLY_URL, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(xenly::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(xenly::timeout),
        help("Increase the timeout with --timeout or check host responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(xenly::json))]
    Json(#[from] serde_json::Error),

    #[error("Cannot render YAML: {0}")]
    #[diagnostic(code(xenly::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected { .. } | Self::Protocol { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Fault { code, .. } if code == "HANDLE_INVALID" => exit_code::NOT_FOUND,
            Self::Fault { code, .. } if code == "PERMISSION_DENIED" => exit_code::PERMISSION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    fn from_fault(fault: &XapiError) -> Self {
        let help = match fault.code.as_str() {
            "HANDLE_INVALID" => "The object no longer exists; refresh and retry.".to_owned(),
            "PERMISSION_DENIED" | "RBAC_PERMISSION_DENIED" => {
                "The logged-in user lacks the role required for this call.".to_owned()
            }
            "MESSAGE_METHOD_UNKNOWN" => {
                "Method names are case-sensitive, e.g. VM.get_all_records.".to_owned()
            }
            _ => fault
                .method
                .as_deref()
                .map_or_else(String::new, |m| format!("Raised by {m}.")),
        };
        Self::Fault {
            code: fault.code.clone(),
            params: fault.params.join(", "),
            help,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed(fault) => CliError::AuthFailed {
                profile: "current".into(),
                fault: fault.to_string(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::NotConnected => CliError::Disconnected {
                reason: "session was lost".into(),
            },

            CoreError::ConnectionClosed => CliError::Disconnected {
                reason: "connection closed".into(),
            },

            CoreError::Protocol { message } => CliError::Protocol { message },

            CoreError::Http { status, message } => CliError::ApiError {
                message: format!("HTTP {status}: {message}"),
            },

            CoreError::Fault(fault) => CliError::from_fault(&fault),

            CoreError::Validation { field, message } => CliError::Validation {
                field,
                reason: message,
            },

            CoreError::Schema(e) => CliError::Protocol {
                message: e.to_string(),
            },

            CoreError::UnexpectedResult { method, message } => CliError::ApiError {
                message: format!("{method}: {message}"),
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::ApiError { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(see `xenly config profiles`)".into(),
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
