// ── Full resync application ──
//
// After the event cursor is lost the watcher re-enumerates every tracked
// class and hands each complete set here.

use std::collections::HashSet;

use super::collection::Upsert;
use super::{CacheDelta, ObjectCache};
use crate::model::{ObjectRecord, ObjectType, OpaqueRef};

impl ObjectCache {
    /// Replace every record of `object_type` with `records`, then mark the
    /// class populated.
    ///
    /// Uses upsert-then-prune: incoming records are upserted first, then
    /// references absent from the incoming set are removed. Readers never
    /// observe a transiently empty class. Deltas are published for what
    /// actually changed and returned in application order.
    pub fn replace_type(
        &self,
        object_type: ObjectType,
        records: Vec<ObjectRecord>,
    ) -> Vec<CacheDelta> {
        let collection = self.collection(object_type);
        let incoming: HashSet<OpaqueRef> = records.iter().map(|r| r.reference.clone()).collect();
        let mut deltas = Vec::new();

        for record in records.into_iter().filter(|r| r.object_type == object_type) {
            match collection.stage_upsert(record) {
                Upsert::Inserted(record) => deltas.push(CacheDelta::Added { record }),
                Upsert::Replaced { old, new } => deltas.push(CacheDelta::Modified { old, new }),
                Upsert::Unchanged => {}
            }
        }

        for reference in collection.references() {
            if !incoming.contains(&reference) {
                if let Some(record) = collection.stage_remove(&reference) {
                    deltas.push(CacheDelta::Removed { record });
                }
            }
        }

        // One snapshot rebuild for the whole class.
        collection.flush();
        for delta in &deltas {
            self.publish(delta);
        }
        collection.mark_populated();

        deltas
    }
}
