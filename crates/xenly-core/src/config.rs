// ── Runtime connection configuration ──
//
// These types describe *how* to connect to a XAPI host. They carry
// credential data and connection tuning, but never touch disk.
// The CLI constructs a `ConnectionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::model::ObjectType;

/// Originator string sent with every login.
pub const DEFAULT_ORIGINATOR: &str = "xenly";

/// Username and password for `session.login_with_password`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. Default: hosts ship with self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

/// Exponential backoff for the event watcher after a failed poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Upper bound on the delay. Default: 30s.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Configuration for one connection to a pool or host.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host URL (e.g., `https://xcp-ng.lan`).
    pub url: Url,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// Timeout for ordinary calls.
    pub timeout: Duration,
    /// How long the host may hold an `event.from` poll open.
    pub event_wait: Duration,
    pub pool_max_idle_per_host: Option<usize>,
    pub pool_idle_timeout: Option<Duration>,
    /// Classes the event watcher subscribes to and keeps cached.
    pub tracked_types: Vec<ObjectType>,
    /// Start the event watcher on connect.
    pub watch_events: bool,
    pub reconnect: ReconnectConfig,
    pub originator: String,
}

impl ConnectionConfig {
    /// Configuration with default tuning for `url`.
    pub fn new(url: Url, credentials: Credentials) -> Self {
        Self {
            url,
            credentials,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            event_wait: Duration::from_secs(60),
            pool_max_idle_per_host: None,
            pool_idle_timeout: None,
            tracked_types: ObjectType::all(),
            watch_events: true,
            reconnect: ReconnectConfig::default(),
            originator: DEFAULT_ORIGINATOR.to_owned(),
        }
    }
}
