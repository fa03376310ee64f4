// ── Session manager ──
//
// Owns the login session for one connection: login and logout, token
// injection, transparent re-login when the host expires the session,
// encoding fallback, and pool-master redirection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use url::Url;
use xenly_api::{Encoding, RpcResult, Transport};

use crate::config::Credentials;
use crate::error::CoreError;

/// API version requested at login.
pub const API_VERSION: &str = "1.1";

const METHOD_LOGIN: &str = "session.login_with_password";
const METHOD_LOGOUT: &str = "session.logout";

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

// ── Session ──────────────────────────────────────────────────────

/// An authenticated session.
///
/// `generation` increases by one with every successful login on a
/// connection; callers that saw a stale generation share one re-login.
#[derive(Debug)]
pub struct Session {
    token: SecretString,
    pub username: String,
    pub api_version: String,
    pub originator: String,
    pub established_at: DateTime<Utc>,
    pub generation: u64,
}

impl Session {
    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

// ── SessionManager ───────────────────────────────────────────────

pub(crate) struct SessionManager {
    /// Swapped when a login is redirected to the pool master.
    transport: ArcSwap<Transport>,
    /// Set once JSON-RPC was found unsupported. Never cleared.
    xml_pinned: AtomicBool,
    credentials: Credentials,
    originator: String,
    session: ArcSwapOption<Session>,
    generation: AtomicU64,
    relogin: Mutex<()>,
    state: watch::Sender<ConnectionState>,
}

impl SessionManager {
    pub(crate) fn new(transport: Transport, credentials: Credentials, originator: String) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport: ArcSwap::from_pointee(transport),
            xml_pinned: AtomicBool::new(false),
            credentials,
            originator,
            session: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            relogin: Mutex::new(()),
            state,
        }
    }

    pub(crate) fn encoding(&self) -> Encoding {
        if self.xml_pinned.load(Ordering::Acquire) {
            Encoding::XmlRpc
        } else {
            Encoding::JsonRpc
        }
    }

    pub(crate) fn session(&self) -> Option<Arc<Session>> {
        self.session.load_full()
    }

    pub(crate) fn base_url(&self) -> Url {
        self.transport.load().base_url().clone()
    }

    pub(crate) fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "connection state changed");
        }
    }

    /// Move to `next` only if the state is still `expected`.
    fn set_state_if(&self, expected: ConnectionState, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == expected && expected != next {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            debug!(state = ?next, "connection state changed");
        }
        changed
    }

    // ── Login / logout ───────────────────────────────────────────

    /// Log in with the configured credentials.
    ///
    /// A credential fault is fatal; there is no retry.
    pub(crate) async fn login(&self) -> Result<Arc<Session>, CoreError> {
        self.set_state(ConnectionState::Connecting);
        match self.authenticate().await {
            Ok(session) => {
                self.set_state(ConnectionState::Connected);
                Ok(session)
            }
            Err(e) => {
                self.session.store(None);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn authenticate(&self) -> Result<Arc<Session>, CoreError> {
        let params = [
            json!(self.credentials.username),
            json!(self.credentials.password.expose_secret()),
            json!(API_VERSION),
            json!(self.originator),
        ];
        let mut redirected = false;

        loop {
            let fault = match self.send(METHOD_LOGIN, &params, None).await?.into_result() {
                Ok(value) => return self.establish(&value),
                Err(fault) => fault.with_method(METHOD_LOGIN),
            };

            if !redirected {
                if let Some(master) = fault.master_address() {
                    let next = self.transport.load().with_host(master)?;
                    info!(master = %next.base_url(), "host is a pool member, redirecting to master");
                    self.transport.store(Arc::new(next));
                    redirected = true;
                    continue;
                }
            }

            return Err(if fault.is_authentication_failure() {
                CoreError::AuthenticationFailed(fault)
            } else {
                CoreError::Fault(fault)
            });
        }
    }

    fn establish(&self, value: &Value) -> Result<Arc<Session>, CoreError> {
        let token = value.as_str().ok_or_else(|| CoreError::UnexpectedResult {
            method: METHOD_LOGIN.into(),
            message: format!("expected a session reference, got {value}"),
        })?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let session = Arc::new(Session {
            token: SecretString::from(token.to_owned()),
            username: self.credentials.username.clone(),
            api_version: API_VERSION.into(),
            originator: self.originator.clone(),
            established_at: Utc::now(),
            generation,
        });
        self.session.store(Some(Arc::clone(&session)));

        info!(
            user = %session.username,
            generation,
            encoding = %self.encoding(),
            "logged in"
        );
        Ok(session)
    }

    /// Re-login after `SESSION_INVALID`, at most once per stale generation.
    ///
    /// Callers that observed the same stale generation queue on the mutex;
    /// the first performs the login, the rest find a newer session and
    /// return it.
    async fn relogin(&self, stale_generation: u64) -> Result<Arc<Session>, CoreError> {
        let _guard = self.relogin.lock().await;

        match self.session() {
            Some(current) if current.generation != stale_generation => return Ok(current),
            Some(_) => {}
            None => return Err(CoreError::NotConnected),
        }

        self.set_state(ConnectionState::Reconnecting);
        match self.authenticate().await {
            Ok(session) => {
                self.set_state(ConnectionState::Connected);
                Ok(session)
            }
            Err(e) if e.is_transient() => {
                // Keep the stale session: the next call hits SESSION_INVALID
                // again and retries the login.
                warn!(error = %e, "re-login failed, will retry on next call");
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "re-login rejected");
                self.session.store(None);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Best-effort logout. Errors are logged, never returned.
    pub(crate) async fn logout(&self) {
        if let Some(session) = self.session.swap(None) {
            let result = self
                .send(METHOD_LOGOUT, &[json!(session.token())], None)
                .await
                .and_then(|r| r.into_result().map_err(CoreError::Fault));
            match result {
                Ok(_) => debug!("logged out"),
                Err(e) => warn!(error = %e, "logout failed (non-fatal)"),
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Calls ────────────────────────────────────────────────────

    /// Call `method` with the session token prepended to `args`.
    ///
    /// `SESSION_INVALID` triggers one shared re-login and one retry; a
    /// second `SESSION_INVALID` is returned to the caller.
    pub(crate) async fn call(
        &self,
        method: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Value, CoreError> {
        let session = self.session().ok_or(CoreError::NotConnected)?;

        match self.call_with(&session, method, args, timeout).await {
            Err(CoreError::Fault(fault)) if fault.is_session_invalid() => {
                debug!(method, generation = session.generation, "session expired");
                let fresh = self.relogin(session.generation).await?;
                self.call_with(&fresh, method, args, timeout).await
            }
            other => other,
        }
    }

    async fn call_with(
        &self,
        session: &Session,
        method: &str,
        args: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Value, CoreError> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(Value::String(session.token().to_owned()));
        params.extend_from_slice(args);

        self.send(method, &params, timeout)
            .await?
            .into_result()
            .map_err(|fault| CoreError::Fault(fault.with_method(method)))
    }

    /// Send on the current encoding, falling back to XML-RPC once if the
    /// host does not speak JSON-RPC.
    async fn send(
        &self,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<RpcResult, CoreError> {
        let transport = self.transport.load_full();
        let encoding = self.encoding();

        match dispatch(&transport, encoding, method, params, timeout).await {
            Err(e) if encoding == Encoding::JsonRpc && e.is_unsupported_transport() => {
                warn!(error = %e, method, "JSON-RPC unsupported, retrying with XML-RPC");
                let downgraded =
                    self.set_state_if(ConnectionState::Connected, ConnectionState::Connecting);

                let result = dispatch(&transport, Encoding::XmlRpc, method, params, timeout).await;
                if result.is_ok() && !self.xml_pinned.swap(true, Ordering::AcqRel) {
                    info!(url = %transport.base_url(), "pinned XML-RPC for this connection");
                }

                // A relogin or close may have moved the state meanwhile.
                if downgraded {
                    self.set_state_if(ConnectionState::Connecting, ConnectionState::Connected);
                }
                result.map_err(CoreError::from)
            }
            other => other.map_err(CoreError::from),
        }
    }
}

async fn dispatch(
    transport: &Transport,
    encoding: Encoding,
    method: &str,
    params: &[Value],
    timeout: Option<Duration>,
) -> Result<RpcResult, xenly_api::Error> {
    match timeout {
        Some(timeout) => {
            transport
                .send_with_timeout(encoding, method, params, timeout)
                .await
        }
        None => transport.send(encoding, method, params).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        let transport = Transport::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            &xenly_api::TransportConfig::default(),
        )
        .unwrap();
        SessionManager::new(transport, Credentials::new("root", "pw"), "test".into())
    }

    #[test]
    fn starts_disconnected_on_json_rpc() {
        let m = manager();
        assert_eq!(m.current_state(), ConnectionState::Disconnected);
        assert_eq!(m.encoding(), Encoding::JsonRpc);
        assert!(m.session().is_none());
    }

    #[test]
    fn establish_bumps_generation() {
        let m = manager();
        let first = m.establish(&json!("OpaqueRef:s1")).unwrap();
        let second = m.establish(&json!("OpaqueRef:s2")).unwrap();
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(m.session().unwrap().token(), "OpaqueRef:s2");
    }

    #[test]
    fn establish_rejects_non_string_token() {
        let m = manager();
        assert!(matches!(
            m.establish(&json!({"not": "a token"})),
            Err(CoreError::UnexpectedResult { .. })
        ));
    }

    #[test]
    fn conditional_state_change_needs_expected_state() {
        let m = manager();
        m.set_state(ConnectionState::Reconnecting);
        assert!(!m.set_state_if(ConnectionState::Connecting, ConnectionState::Connected));
        assert_eq!(m.current_state(), ConnectionState::Reconnecting);

        assert!(m.set_state_if(ConnectionState::Reconnecting, ConnectionState::Connected));
        assert_eq!(m.current_state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn fallback_keeps_state_changed_during_retry() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/jsonrpc"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        "<?xml version=\"1.0\"?><methodResponse><params><param><value><struct>\
                         <member><name>Status</name><value>Success</value></member>\
                         <member><name>Value</name><value>ok</value></member>\
                         </struct></value></param></params></methodResponse>",
                    )
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let transport = Transport::new(
            Url::parse(&server.uri()).unwrap(),
            &xenly_api::TransportConfig::default(),
        )
        .unwrap();
        let m = SessionManager::new(transport, Credentials::new("root", "pw"), "test".into());
        m.establish(&json!("OpaqueRef:s1")).unwrap();
        m.set_state(ConnectionState::Connected);

        let (result, ()) = tokio::join!(m.call("host.get_all", &[], None), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(m.current_state(), ConnectionState::Connecting);
            m.set_state(ConnectionState::Disconnected);
        });

        assert_eq!(result.unwrap(), json!("ok"));
        assert_eq!(m.current_state(), ConnectionState::Disconnected);
        assert_eq!(m.encoding(), Encoding::XmlRpc);
    }

    #[tokio::test]
    async fn call_without_session_is_not_connected() {
        let m = manager();
        let err = m.call("VM.get_all", &[], None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotConnected));
    }
}
