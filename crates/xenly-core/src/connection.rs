// ── Connection abstraction ──
//
// Lifecycle of one connection to a pool: login, the event watcher that
// keeps the object cache live, remote calls, and close.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use xenly_api::{Encoding, PoolConfig, TlsMode, Transport, TransportConfig};

use crate::config::{ConnectionConfig, TlsVerification};
use crate::error::CoreError;
use crate::model::{ObjectRecord, ObjectType, OpaqueRef};
use crate::session::{ConnectionState, Session, SessionManager};
use crate::store::ObjectCache;
use crate::stream::{DeltaStream, EntityStream};
use crate::watcher::EventWatcher;

// ── Connection ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ConnectionInner>`; all clones share one
/// session, one cache and one watcher. Calls may run concurrently.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    session: Arc<SessionManager>,
    cache: Arc<ObjectCache>,
    /// Cancelled by `close()`. Never reset: a closed connection stays closed.
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Create a connection from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to log in and start the watcher.
    pub fn new(config: ConnectionConfig) -> Result<Self, CoreError> {
        let transport = Transport::new(config.url.clone(), &transport_config(&config))?;
        let session = SessionManager::new(
            transport,
            config.credentials.clone(),
            config.originator.clone(),
        );

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                config,
                session: Arc::new(session),
                cache: Arc::new(ObjectCache::new()),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Access the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Access the live object cache.
    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.inner.cache
    }

    /// Subscribe to connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.state()
    }

    /// Encoding currently used for calls.
    pub fn encoding(&self) -> Encoding {
        self.inner.session.encoding()
    }

    /// The current session, if logged in.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.session.session()
    }

    /// Endpoint calls go to. Differs from the configured URL after a
    /// redirect to the pool master.
    pub fn base_url(&self) -> Url {
        self.inner.session.base_url()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Log in and, when enabled, start the event watcher.
    ///
    /// The cache fills in the background; use
    /// [`wait_populated()`](Self::wait_populated) before reading a class.
    /// Calling this on a live connection does nothing: there is at most
    /// one session and one watcher per connection.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::ConnectionClosed);
        }

        // Held for the whole call so concurrent connects serialize.
        let mut handles = self.inner.task_handles.lock().await;
        if self.inner.session.session().is_some() {
            debug!("already connected");
            return Ok(());
        }
        // A watcher that stopped after losing the session is replaced.
        for handle in handles.drain(..) {
            handle.abort();
        }

        let session = self.guarded(self.inner.session.login()).await?;
        info!(
            url = %self.base_url(),
            encoding = %self.encoding(),
            generation = session.generation,
            "connected"
        );

        if self.inner.config.watch_events {
            let watcher = EventWatcher::new(
                Arc::clone(&self.inner.session),
                Arc::clone(&self.inner.cache),
                self.inner.config.tracked_types.clone(),
                self.inner.config.event_wait,
                self.inner.config.reconnect.clone(),
                self.inner.cancel.child_token(),
            );
            handles.extend(watcher.spawn());
            debug!(
                classes = self.inner.config.tracked_types.len(),
                "event watcher spawned"
            );
        }

        Ok(())
    }

    /// Close the connection.
    ///
    /// Stops the watcher, fails in-flight calls with
    /// [`ConnectionClosed`](CoreError::ConnectionClosed), logs out
    /// (best-effort) and clears the cache. Idempotent.
    pub async fn close(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task panicked");
            }
        }
        drop(handles);

        self.inner.session.logout().await;
        self.inner.cache.clear();
        debug!("connection closed");
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, close.
    ///
    /// Disables the event watcher since only request-response calls are
    /// needed.
    pub async fn oneshot<F, Fut, T>(config: ConnectionConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.watch_events = false;

        let connection = Connection::new(cfg)?;
        connection.connect().await?;
        let result = f(connection.clone()).await;
        connection.close().await;
        result
    }

    // ── Calls ────────────────────────────────────────────────────

    /// Call `method` with the session reference prepended to `args`.
    ///
    /// Remote faults come back as [`CoreError::Fault`] with their code and
    /// parameters intact.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value, CoreError> {
        self.guarded(self.inner.session.call(method, args, None))
            .await
    }

    /// Like [`call()`](Self::call), deserializing the result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<T, CoreError> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| CoreError::UnexpectedResult {
            method: method.to_owned(),
            message: e.to_string(),
        })
    }

    /// Call a method whose result is an object reference.
    pub(crate) async fn call_for_ref(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<OpaqueRef, CoreError> {
        let reference: OpaqueRef = self.call_as(method, args).await?;
        if reference.is_null() {
            return Err(CoreError::UnexpectedResult {
                method: method.to_owned(),
                message: "returned a null reference".into(),
            });
        }
        Ok(reference)
    }

    /// Race `fut` against close. Nothing completes successfully once the
    /// connection has been closed.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        if self.is_closed() {
            return Err(CoreError::ConnectionClosed);
        }

        let result = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => return Err(CoreError::ConnectionClosed),
            result = fut => result,
        };

        if self.is_closed() {
            return Err(CoreError::ConnectionClosed);
        }
        result
    }

    // ── Cache access ─────────────────────────────────────────────

    /// Wait until the watcher has enumerated `object_type` at least once.
    pub async fn wait_populated(&self, object_type: ObjectType) -> Result<(), CoreError> {
        if !self.inner.config.watch_events {
            return Err(CoreError::Config {
                message: "event watching is disabled for this connection".into(),
            });
        }
        if !self.inner.config.tracked_types.contains(&object_type) {
            return Err(CoreError::validation(
                "object_type",
                format!("{object_type} is not tracked by this connection"),
            ));
        }
        self.guarded(async {
            self.inner.cache.wait_populated(object_type).await;
            Ok(())
        })
        .await
    }

    /// Stream of deltas applied to the cache.
    pub fn subscribe(&self) -> DeltaStream {
        self.inner.cache.subscribe()
    }

    /// Snapshot stream for one class.
    pub fn watch_type(&self, object_type: ObjectType) -> EntityStream<ObjectRecord> {
        self.inner.cache.watch_type(object_type)
    }

    // ── Typed helpers ────────────────────────────────────────────

    /// Reference of the pool master host.
    ///
    /// Read from the cache when the pool has been enumerated, otherwise
    /// fetched with `pool.get_all` and `pool.get_master`.
    pub async fn pool_master_ref(&self) -> Result<OpaqueRef, CoreError> {
        if let Some(master) = self.inner.cache.pool_master() {
            return Ok(master.reference.clone());
        }

        let pools: Vec<OpaqueRef> = self.call_as("pool.get_all", &[]).await?;
        let pool = pools
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::UnexpectedResult {
                method: "pool.get_all".into(),
                message: "host reports no pool".into(),
            })?;
        self.call_for_ref("pool.get_master", &[json!(pool)]).await
    }
}

fn transport_config(config: &ConnectionConfig) -> TransportConfig {
    let tls = match &config.tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    };
    TransportConfig {
        tls,
        timeout: config.timeout,
        pool: PoolConfig {
            max_idle_per_host: config.pool_max_idle_per_host,
            idle_timeout: config.pool_idle_timeout,
        },
    }
}
