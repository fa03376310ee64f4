// ── Event watcher ──
//
// Keeps the object cache in step with the host. A producer task long-polls
// `event.from` and forwards batches in delivery order over an mpsc channel;
// a single consumer task applies them to the cache. A lost cursor triggers
// a full re-enumeration that callers never see.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use xenly_api::{EventBatch, EventOperation, EventRecord};

use crate::config::ReconnectConfig;
use crate::error::CoreError;
use crate::model::{ObjectRecord, ObjectType, OpaqueRef};
use crate::session::SessionManager;
use crate::store::{CacheEvent, ObjectCache};

const METHOD_EVENT_FROM: &str = "event.from";
const CHANNEL_SIZE: usize = 16;

/// Extra time on top of the server-side wait before the poll times out.
const POLL_MARGIN: Duration = Duration::from_secs(10);

enum WatchMessage {
    /// Complete contents of every tracked class.
    Resync(HashMap<ObjectType, Vec<ObjectRecord>>),
    Events(Vec<CacheEvent>),
}

pub(crate) struct EventWatcher {
    session: Arc<SessionManager>,
    cache: Arc<ObjectCache>,
    classes: Vec<ObjectType>,
    wait: Duration,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

impl EventWatcher {
    pub(crate) fn new(
        session: Arc<SessionManager>,
        cache: Arc<ObjectCache>,
        classes: Vec<ObjectType>,
        wait: Duration,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            cache,
            classes,
            wait,
            reconnect,
            cancel,
        }
    }

    /// Spawn the producer and consumer tasks.
    pub(crate) fn spawn(self) -> Vec<JoinHandle<()>> {
        let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
        let watcher = Arc::new(self);
        vec![
            tokio::spawn(poll_task(Arc::clone(&watcher), tx)),
            tokio::spawn(apply_task(watcher, rx)),
        ]
    }

    fn class_names(&self) -> Value {
        Value::Array(self.classes.iter().map(|c| json!(c.to_string())).collect())
    }

    /// Fetch every tracked object and a fresh cursor.
    async fn enumerate(&self) -> Result<(WatchMessage, String), CoreError> {
        let value = self
            .session
            .call(METHOD_EVENT_FROM, &[self.class_names(), json!(""), json!(0.0)], None)
            .await?;
        let batch = EventBatch::from_value(value)?;
        debug!(records = batch.events.len(), "enumerated tracked classes");

        let mut by_type: HashMap<ObjectType, Vec<ObjectRecord>> =
            self.classes.iter().map(|t| (*t, Vec::new())).collect();
        for event in self.convert(batch.events) {
            if let CacheEvent::Added(record) | CacheEvent::Modified(record) = event {
                by_type.entry(record.object_type).or_default().push(record);
            }
        }

        Ok((WatchMessage::Resync(by_type), batch.token))
    }

    /// Wait for changes after `cursor`.
    async fn poll(&self, cursor: &str) -> Result<(WatchMessage, String), CoreError> {
        let params = [
            self.class_names(),
            json!(cursor),
            json!(self.wait.as_secs_f64()),
        ];
        let value = self
            .session
            .call(METHOD_EVENT_FROM, &params, Some(self.wait + POLL_MARGIN))
            .await?;
        let batch = EventBatch::from_value(value)?;
        trace!(events = batch.events.len(), "event batch received");

        Ok((WatchMessage::Events(self.convert(batch.events)), batch.token))
    }

    /// Convert wire events, dropping untracked classes and logging records
    /// that fail validation.
    fn convert(&self, events: Vec<EventRecord>) -> Vec<CacheEvent> {
        events
            .into_iter()
            .filter_map(|event| match to_cache_event(event, &self.classes) {
                Ok(converted) => converted,
                Err(e) => {
                    warn!(error = %e, "skipping event record");
                    None
                }
            })
            .collect()
    }
}

fn to_cache_event(
    event: EventRecord,
    tracked: &[ObjectType],
) -> Result<Option<CacheEvent>, CoreError> {
    let Ok(object_type) = event.class.parse::<ObjectType>() else {
        trace!(class = %event.class, "ignoring untracked class");
        return Ok(None);
    };
    if !tracked.contains(&object_type) {
        return Ok(None);
    }

    let reference = OpaqueRef::new(event.reference);
    if event.operation == EventOperation::Del {
        return Ok(Some(CacheEvent::Removed {
            object_type,
            reference,
        }));
    }

    let Some(snapshot) = event.snapshot else {
        return Err(CoreError::Protocol {
            message: format!("{:?} event for {object_type} {reference} has no snapshot", event.operation),
        });
    };
    let record = ObjectRecord::from_snapshot(object_type, reference, &snapshot)?;

    Ok(Some(match event.operation {
        EventOperation::Add => CacheEvent::Added(record),
        _ => CacheEvent::Modified(record),
    }))
}

/// Errors after which polling cannot make progress.
fn is_fatal(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::NotConnected | CoreError::ConnectionClosed | CoreError::AuthenticationFailed(_)
    )
}

// ── Background tasks ─────────────────────────────────────────────

/// Long-poll the event feed and forward batches to the applier.
async fn poll_task(watcher: Arc<EventWatcher>, tx: mpsc::Sender<WatchMessage>) {
    let cancel = watcher.cancel.clone();
    let mut cursor: Option<String> = None;
    let mut failures: u32 = 0;

    loop {
        let step = async {
            match cursor.as_deref() {
                None => watcher.enumerate().await,
                Some(token) => watcher.poll(token).await,
            }
        };

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = step => result,
        };

        match result {
            Ok((message, token)) => {
                failures = 0;
                if tx.send(message).await.is_err() {
                    break;
                }
                cursor = Some(token);
            }
            Err(CoreError::Fault(ref fault)) if cursor.is_some() && fault.is_cursor_invalid() => {
                info!(code = %fault.code, "event cursor invalidated, resynchronizing");
                cursor = None;
            }
            Err(e) if is_fatal(&e) => {
                warn!(error = %e, "event watcher stopped");
                break;
            }
            Err(e) => {
                let delay = calculate_backoff(failures, &watcher.reconnect);
                failures = failures.saturating_add(1);
                warn!(
                    error = %e,
                    attempt = failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "event poll failed, backing off"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!("event poll task stopped");
}

/// Apply forwarded batches to the cache, one record at a time.
async fn apply_task(watcher: Arc<EventWatcher>, mut rx: mpsc::Receiver<WatchMessage>) {
    let cancel = watcher.cancel.clone();

    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                message
            }
        };

        match message {
            WatchMessage::Resync(mut by_type) => {
                for object_type in &watcher.classes {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let records = by_type.remove(object_type).unwrap_or_default();
                    let deltas = watcher.cache.replace_type(*object_type, records);
                    debug!(%object_type, changed = deltas.len(), "class resynchronized");
                }
                info!(classes = watcher.classes.len(), "object cache populated");
            }
            WatchMessage::Events(events) => {
                if cancel.is_cancelled() {
                    return;
                }
                for delta in watcher.cache.apply_batch(events) {
                    trace!(
                        kind = delta.kind(),
                        object_type = %delta.object_type(),
                        reference = %delta.reference(),
                        "applied"
                    );
                }
            }
        }
    }

    debug!("event apply task stopped");
}

// ── Backoff ──────────────────────────────────────────────────────

/// Exponential backoff with deterministic jitter.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(16)).unwrap_or(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Seeded from the attempt number: spread, not randomness.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}
