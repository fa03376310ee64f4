// ── Derived views ──
//
// Read-only projections over the cache. Each is recomputed from the
// current snapshots on every call; nothing is memoized.

use std::sync::Arc;

use super::ObjectCache;
use crate::model::{FieldKind, ObjectRecord, ObjectType, OpaqueRef, schema};

/// Label used when a PIF has no metrics record yet.
pub const UNKNOWN_DEVICE_NAME: &str = "unknown";

impl ObjectCache {
    /// The pool record. A host always belongs to exactly one pool.
    pub fn pool(&self) -> Option<Arc<ObjectRecord>> {
        self.list(ObjectType::Pool).first().cloned()
    }

    /// The host currently acting as pool master.
    pub fn pool_master(&self) -> Option<Arc<ObjectRecord>> {
        let pool = self.pool()?;
        self.resolve(&pool, "master")
    }

    /// PIFs that can join a new bond or carry a new VLAN: untagged, not
    /// already a bond slave, and on the pool master. Sorted by device name.
    pub fn bondable_pifs(&self) -> Vec<Arc<ObjectRecord>> {
        let Some(master) = self.pool_master() else {
            return Vec::new();
        };

        let mut pifs: Vec<Arc<ObjectRecord>> = self
            .list(ObjectType::Pif)
            .iter()
            .filter(|pif| pif.int_field("VLAN") == Some(-1))
            .filter(|pif| pif.ref_field("bond_slave_of").is_none())
            .filter(|pif| pif.ref_field("host") == Some(&master.reference))
            .cloned()
            .collect();
        pifs.sort_by(|a, b| a.str_field("device").cmp(&b.str_field("device")));
        pifs
    }

    /// `"eth0 (Intel Corporation 82599)"`, using the PIF metrics' device name.
    pub fn pif_label(&self, pif: &ObjectRecord) -> String {
        let device = pif.str_field("device").unwrap_or_default();
        let name = self
            .resolve(pif, "metrics")
            .and_then(|m| m.str_field("device_name").map(str::to_owned))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_owned());
        format!("{device} ({name})")
    }

    /// Real VMs: no templates, snapshots or control domains.
    pub fn vms(&self) -> Vec<Arc<ObjectRecord>> {
        self.list(ObjectType::Vm)
            .iter()
            .filter(|vm| {
                !vm.bool_field("is_a_template").unwrap_or(false)
                    && !vm.bool_field("is_a_snapshot").unwrap_or(false)
                    && !vm.bool_field("is_control_domain").unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// VMs currently running on `host`.
    pub fn resident_vms(&self, host: &OpaqueRef) -> Vec<Arc<ObjectRecord>> {
        self.vms()
            .into_iter()
            .filter(|vm| vm.ref_field("resident_on") == Some(host))
            .collect()
    }

    /// Follow a reference field to its target, if the target is cached.
    pub fn resolve(&self, record: &ObjectRecord, field: &str) -> Option<Arc<ObjectRecord>> {
        let Some(FieldKind::Ref(target)) = schema::kind_of(record.object_type, field) else {
            return None;
        };
        self.get(target, record.ref_field(field)?)
    }

    /// Follow a ref-set field. Targets not in the cache are skipped.
    pub fn resolve_all(&self, record: &ObjectRecord, field: &str) -> Vec<Arc<ObjectRecord>> {
        let Some(FieldKind::RefSet(target)) = schema::kind_of(record.object_type, field) else {
            return Vec::new();
        };
        record
            .refs_field(field)
            .into_iter()
            .filter_map(|r| self.get(target, r))
            .collect()
    }
}
