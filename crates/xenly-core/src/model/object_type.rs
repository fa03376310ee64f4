// ── Tracked object classes ──

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

/// A remote object class the cache tracks.
///
/// `Display` yields the canonical XAPI class name (`VM`, `PIF_metrics`, …).
/// Parsing is case-insensitive because the event feed reports classes in
/// lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ObjectType {
    #[strum(serialize = "pool")]
    Pool,
    #[strum(serialize = "host")]
    Host,
    #[strum(serialize = "host_metrics")]
    HostMetrics,
    #[strum(serialize = "VM")]
    Vm,
    #[strum(serialize = "VM_metrics")]
    VmMetrics,
    #[strum(serialize = "VM_guest_metrics")]
    VmGuestMetrics,
    #[strum(serialize = "PIF")]
    Pif,
    #[strum(serialize = "PIF_metrics")]
    PifMetrics,
    #[strum(serialize = "network")]
    Network,
    #[strum(serialize = "Bond")]
    Bond,
    #[strum(serialize = "VLAN")]
    Vlan,
    #[strum(serialize = "SR")]
    Sr,
    #[strum(serialize = "VDI")]
    Vdi,
    #[strum(serialize = "VBD")]
    Vbd,
    #[strum(serialize = "VIF")]
    Vif,
    #[strum(serialize = "task")]
    Task,
    #[strum(serialize = "message")]
    Message,
}

impl ObjectType {
    /// Every tracked class, in declaration order.
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}

impl Serialize for ObjectType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown object type `{s}`")))
    }
}
