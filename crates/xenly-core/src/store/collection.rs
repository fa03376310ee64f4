// ── Per-class reactive record collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based
// change notification via `watch` channels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{ObjectRecord, OpaqueRef};

/// Result of an upsert.
#[derive(Debug)]
pub(crate) enum Upsert {
    Inserted(Arc<ObjectRecord>),
    Replaced {
        old: Arc<ObjectRecord>,
        new: Arc<ObjectRecord>,
    },
    /// An identical record was already stored.
    Unchanged,
}

/// Records of a single object class.
///
/// Uses `DashMap` for concurrent lookups and `watch` channels for
/// push-based change notification. Staged mutations only mark the
/// snapshot dirty; [`flush`](Self::flush) rebuilds it once per batch.
pub(crate) struct TypeCollection {
    /// Primary storage: reference -> record.
    by_ref: DashMap<OpaqueRef, Arc<ObjectRecord>>,

    /// Secondary index: uuid -> reference.
    uuid_to_ref: DashMap<String, OpaqueRef>,

    /// Full snapshot, rebuilt on flush for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<ObjectRecord>>>>,

    /// Storage changed since the last snapshot rebuild.
    dirty: AtomicBool,

    /// Set once the class has been fully enumerated.
    populated: watch::Sender<bool>,
}

impl TypeCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (populated, _) = watch::channel(false);

        Self {
            by_ref: DashMap::new(),
            uuid_to_ref: DashMap::new(),
            snapshot,
            dirty: AtomicBool::new(false),
            populated,
        }
    }

    /// Insert or replace a record and publish the new snapshot.
    pub(crate) fn upsert(&self, record: ObjectRecord) -> Upsert {
        let result = self.stage_upsert(record);
        self.flush();
        result
    }

    /// Remove a record and publish the new snapshot. Returns it if it existed.
    pub(crate) fn remove(&self, reference: &OpaqueRef) -> Option<Arc<ObjectRecord>> {
        let removed = self.stage_remove(reference);
        self.flush();
        removed
    }

    /// Insert or replace a record without rebuilding the snapshot,
    /// skipping identical content.
    pub(crate) fn stage_upsert(&self, record: ObjectRecord) -> Upsert {
        if let Some(existing) = self.by_ref.get(&record.reference) {
            if **existing == record {
                return Upsert::Unchanged;
            }
        }

        let new = Arc::new(record);
        let old = self
            .by_ref
            .insert(new.reference.clone(), Arc::clone(&new));

        // Clean up a stale uuid mapping if the uuid changed.
        if let Some(old_uuid) = old.as_ref().and_then(|o| o.uuid()) {
            if Some(old_uuid) != new.uuid() {
                self.uuid_to_ref.remove(old_uuid);
            }
        }
        if let Some(uuid) = new.uuid() {
            self.uuid_to_ref.insert(uuid.to_owned(), new.reference.clone());
        }

        self.dirty.store(true, Ordering::Release);

        match old {
            Some(old) => Upsert::Replaced { old, new },
            None => Upsert::Inserted(new),
        }
    }

    /// Remove a record without rebuilding the snapshot.
    pub(crate) fn stage_remove(&self, reference: &OpaqueRef) -> Option<Arc<ObjectRecord>> {
        let removed = self.by_ref.remove(reference).map(|(_, v)| v);
        if let Some(ref record) = removed {
            if let Some(uuid) = record.uuid() {
                self.uuid_to_ref.remove(uuid);
            }
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    /// Rebuild and broadcast the snapshot if anything was staged since the
    /// last flush.
    pub(crate) fn flush(&self) {
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.rebuild_snapshot();
        }
    }

    pub(crate) fn get(&self, reference: &OpaqueRef) -> Option<Arc<ObjectRecord>> {
        self.by_ref.get(reference).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn get_by_uuid(&self, uuid: &str) -> Option<Arc<ObjectRecord>> {
        let reference = self.uuid_to_ref.get(uuid)?.value().clone();
        self.get(&reference)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<ObjectRecord>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<ObjectRecord>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn references(&self) -> Vec<OpaqueRef> {
        self.by_ref.iter().map(|r| r.key().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_ref.len()
    }

    // ── Population flag ──────────────────────────────────────────────

    pub(crate) fn is_populated(&self) -> bool {
        *self.populated.borrow()
    }

    pub(crate) fn mark_populated(&self) {
        self.populated.send_if_modified(|p| !std::mem::replace(p, true));
    }

    pub(crate) fn watch_populated(&self) -> watch::Receiver<bool> {
        self.populated.subscribe()
    }

    /// Remove all records and reset the population flag.
    pub(crate) fn clear(&self) {
        self.by_ref.clear();
        self.uuid_to_ref.clear();
        self.dirty.store(false, Ordering::Release);
        self.rebuild_snapshot();
        self.populated.send_replace(false);
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a sorted snapshot vec and broadcast it.
    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<ObjectRecord>> =
            self.by_ref.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.reference.cmp(&b.reference));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
