// ── Object cache ──
//
// In-memory index of every known remote object, keyed by class and
// reference. The event watcher is the only writer; any number of readers
// take lock-free snapshots or subscribe to applied deltas.

mod collection;
mod refresh;
mod views;

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{ObjectRecord, ObjectType, OpaqueRef};
use crate::stream::{DeltaStream, EntityStream};

use collection::{TypeCollection, Upsert};

const DELTA_CHANNEL_SIZE: usize = 1024;

/// A change to apply to the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Added(ObjectRecord),
    Modified(ObjectRecord),
    Removed {
        object_type: ObjectType,
        reference: OpaqueRef,
    },
}

/// A change the cache actually applied.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheDelta {
    Added {
        record: Arc<ObjectRecord>,
    },
    Modified {
        old: Arc<ObjectRecord>,
        new: Arc<ObjectRecord>,
    },
    Removed {
        record: Arc<ObjectRecord>,
    },
}

impl CacheDelta {
    /// The record as it stands after the change (before it, for removals).
    pub fn record(&self) -> &Arc<ObjectRecord> {
        match self {
            Self::Added { record } | Self::Removed { record } => record,
            Self::Modified { new, .. } => new,
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.record().object_type
    }

    pub fn reference(&self) -> &OpaqueRef {
        &self.record().reference
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Modified { .. } => "modified",
            Self::Removed { .. } => "removed",
        }
    }
}

/// Live index of remote objects.
pub struct ObjectCache {
    collections: DashMap<ObjectType, Arc<TypeCollection>>,
    deltas: broadcast::Sender<CacheDelta>,
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectCache {
    pub fn new() -> Self {
        let (deltas, _) = broadcast::channel(DELTA_CHANNEL_SIZE);
        let collections = DashMap::new();
        for object_type in ObjectType::all() {
            collections.insert(object_type, Arc::new(TypeCollection::new()));
        }
        Self {
            collections,
            deltas,
        }
    }

    fn collection(&self, object_type: ObjectType) -> Arc<TypeCollection> {
        if let Some(c) = self.collections.get(&object_type) {
            return Arc::clone(c.value());
        }
        Arc::clone(
            self.collections
                .entry(object_type)
                .or_insert_with(|| Arc::new(TypeCollection::new()))
                .value(),
        )
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Point lookup. `None` means "unknown, possibly stale", never an error.
    pub fn get(&self, object_type: ObjectType, reference: &OpaqueRef) -> Option<Arc<ObjectRecord>> {
        self.collection(object_type).get(reference)
    }

    pub fn get_by_uuid(&self, object_type: ObjectType, uuid: &str) -> Option<Arc<ObjectRecord>> {
        self.collection(object_type).get_by_uuid(uuid)
    }

    /// Snapshot of every record of a class, sorted by reference.
    ///
    /// Iterating the snapshot never blocks the writer.
    pub fn list(&self, object_type: ObjectType) -> Arc<Vec<Arc<ObjectRecord>>> {
        self.collection(object_type).snapshot()
    }

    pub fn count(&self, object_type: ObjectType) -> usize {
        self.collection(object_type).len()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Apply one change. Returns the delta, or `None` for a no-op.
    ///
    /// - an add or modify identical to the stored record changes nothing;
    /// - a modify for an unknown reference is an add;
    /// - a remove for an unknown reference changes nothing.
    pub fn apply(&self, event: CacheEvent) -> Option<CacheDelta> {
        let (delta, collection) = self.stage(event)?;
        collection.flush();
        self.publish(&delta);
        Some(delta)
    }

    /// Apply a batch of changes in order, with the same rules as
    /// [`apply`](Self::apply).
    ///
    /// Each touched class rebuilds its snapshot once; deltas are published
    /// after all snapshots are current and returned in application order.
    pub fn apply_batch(&self, events: impl IntoIterator<Item = CacheEvent>) -> Vec<CacheDelta> {
        let mut touched: Vec<Arc<TypeCollection>> = Vec::new();
        let mut deltas = Vec::new();

        for event in events {
            let Some((delta, collection)) = self.stage(event) else {
                continue;
            };
            if !touched.iter().any(|c| Arc::ptr_eq(c, &collection)) {
                touched.push(collection);
            }
            deltas.push(delta);
        }

        for collection in &touched {
            collection.flush();
        }
        for delta in &deltas {
            self.publish(delta);
        }
        deltas
    }

    /// Write one change to storage without publishing anything.
    fn stage(&self, event: CacheEvent) -> Option<(CacheDelta, Arc<TypeCollection>)> {
        match event {
            CacheEvent::Added(record) | CacheEvent::Modified(record) => {
                let collection = self.collection(record.object_type);
                let delta = match collection.stage_upsert(record) {
                    Upsert::Inserted(record) => CacheDelta::Added { record },
                    Upsert::Replaced { old, new } => CacheDelta::Modified { old, new },
                    Upsert::Unchanged => return None,
                };
                Some((delta, collection))
            }
            CacheEvent::Removed {
                object_type,
                reference,
            } => {
                let collection = self.collection(object_type);
                let record = collection.stage_remove(&reference)?;
                Some((CacheDelta::Removed { record }, collection))
            }
        }
    }

    fn publish(&self, delta: &CacheDelta) {
        // No receivers is fine.
        let _ = self.deltas.send(delta.clone());
    }

    /// Drop every record and population flag.
    ///
    /// No deltas are published; subscribers see the emptied snapshots.
    pub fn clear(&self) {
        for entry in &self.collections {
            entry.value().clear();
        }
    }

    // ── Population ───────────────────────────────────────────────────

    /// `true` once the class has been fully enumerated at least once.
    pub fn is_populated(&self, object_type: ObjectType) -> bool {
        self.collection(object_type).is_populated()
    }

    pub fn mark_populated(&self, object_type: ObjectType) {
        self.collection(object_type).mark_populated();
    }

    pub fn populated_types(&self) -> Vec<ObjectType> {
        let mut types: Vec<ObjectType> = self
            .collections
            .iter()
            .filter(|e| e.value().is_populated())
            .map(|e| *e.key())
            .collect();
        types.sort();
        types
    }

    /// Wait until the class is populated. Returns immediately if it is.
    pub async fn wait_populated(&self, object_type: ObjectType) {
        let mut rx = self.collection(object_type).watch_populated();
        // The sender lives as long as the collection, which we hold.
        let _ = rx.wait_for(|populated| *populated).await;
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Stream of every delta applied from now on.
    pub fn subscribe(&self) -> DeltaStream {
        DeltaStream::new(self.deltas.subscribe())
    }

    /// Snapshot stream for one class.
    pub fn watch_type(&self, object_type: ObjectType) -> EntityStream<ObjectRecord> {
        EntityStream::new(self.collection(object_type).subscribe())
    }
}
