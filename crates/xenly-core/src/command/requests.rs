// ── Typed request structs for composite operations ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::model::OpaqueRef;

pub const DEFAULT_MTU: u32 = 1500;
pub const MIN_MTU: u32 = 68;
pub const MAX_MTU: u32 = 9216;
pub const MAX_VLAN: u16 = 4094;

/// Bond balancing mode, as `Bond.create` spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BondMode {
    BalanceSlb,
    ActiveBackup,
    Lacp,
}

// ── Network ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    pub name_label: String,
    #[serde(default)]
    pub name_description: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// VLAN tag; requires exactly one PIF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    #[serde(default)]
    pub bonded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<BondMode>,
    #[serde(default)]
    pub pifs: Vec<OpaqueRef>,
    #[serde(default)]
    pub other_config: BTreeMap<String, String>,
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

/// How a new network attaches to the hosts, derived from a validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTopology {
    /// No physical interface.
    Internal,
    /// Tagged (or untagged, tag 0) on one PIF.
    Vlan { pif: OpaqueRef, tag: u16 },
    Bond { pifs: Vec<OpaqueRef>, mode: BondMode },
}

impl CreateNetworkRequest {
    pub fn new(name_label: impl Into<String>) -> Self {
        Self {
            name_label: name_label.into(),
            name_description: String::new(),
            mtu: DEFAULT_MTU,
            vlan: None,
            bonded: false,
            bond_mode: None,
            pifs: Vec::new(),
            other_config: BTreeMap::new(),
        }
    }

    /// Check the request without touching the host.
    pub fn validate(&self) -> Result<NetworkTopology, CoreError> {
        if self.name_label.trim().is_empty() {
            return Err(CoreError::validation("name_label", "must not be empty"));
        }
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(CoreError::validation(
                "mtu",
                format!("{} is outside {MIN_MTU}..={MAX_MTU}", self.mtu),
            ));
        }
        if self.pifs.iter().any(OpaqueRef::is_null) {
            return Err(CoreError::validation("pifs", "contains a null reference"));
        }

        if self.bonded {
            return self.validate_bond();
        }

        if self.bond_mode.is_some() {
            return Err(CoreError::validation(
                "bond_mode",
                "only applies to bonded networks",
            ));
        }
        if let Some(tag) = self.vlan {
            if tag > MAX_VLAN {
                return Err(CoreError::validation(
                    "vlan",
                    format!("{tag} is outside 0..={MAX_VLAN}"),
                ));
            }
        }

        match self.pifs.as_slice() {
            [] if self.vlan.is_some() => Err(CoreError::validation(
                "pifs",
                "a VLAN needs exactly one interface",
            )),
            [] => Ok(NetworkTopology::Internal),
            [pif] => Ok(NetworkTopology::Vlan {
                pif: pif.clone(),
                tag: self.vlan.unwrap_or(0),
            }),
            _ if self.vlan.is_some() => Err(CoreError::validation(
                "pifs",
                "a VLAN needs exactly one interface",
            )),
            _ => Err(CoreError::validation(
                "pifs",
                "multiple interfaces require bonding",
            )),
        }
    }

    fn validate_bond(&self) -> Result<NetworkTopology, CoreError> {
        if self.vlan.is_some() {
            return Err(CoreError::validation(
                "vlan",
                "VLAN and bonding are mutually exclusive",
            ));
        }
        let Some(mode) = self.bond_mode else {
            return Err(CoreError::validation("bond_mode", "required for a bond"));
        };
        if self.pifs.len() < 2 {
            return Err(CoreError::validation(
                "pifs",
                "a bond needs at least two interfaces",
            ));
        }
        for (i, pif) in self.pifs.iter().enumerate() {
            if self.pifs[..i].contains(pif) {
                return Err(CoreError::validation(
                    "pifs",
                    format!("{pif} is listed twice"),
                ));
            }
        }

        Ok(NetworkTopology::Bond {
            pifs: self.pifs.clone(),
            mode,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pif(n: u32) -> OpaqueRef {
        OpaqueRef::new(format!("OpaqueRef:pif{n}"))
    }

    fn invalid_field(request: &CreateNetworkRequest) -> String {
        match request.validate() {
            Err(CoreError::Validation { field, .. }) => field,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn no_interfaces_is_internal() {
        assert_eq!(
            CreateNetworkRequest::new("private").validate().unwrap(),
            NetworkTopology::Internal
        );
    }

    #[test]
    fn single_pif_without_tag_uses_tag_zero() {
        let mut request = CreateNetworkRequest::new("lan");
        request.pifs = vec![pif(0)];
        assert_eq!(
            request.validate().unwrap(),
            NetworkTopology::Vlan { pif: pif(0), tag: 0 }
        );
    }

    #[test]
    fn bond_with_two_pifs() {
        let mut request = CreateNetworkRequest::new("storage");
        request.bonded = true;
        request.bond_mode = Some(BondMode::Lacp);
        request.pifs = vec![pif(0), pif(1)];
        assert_eq!(
            request.validate().unwrap(),
            NetworkTopology::Bond {
                pifs: vec![pif(0), pif(1)],
                mode: BondMode::Lacp
            }
        );
    }

    #[test]
    fn rejects_bond_with_one_pif() {
        let mut request = CreateNetworkRequest::new("storage");
        request.bonded = true;
        request.bond_mode = Some(BondMode::ActiveBackup);
        request.pifs = vec![pif(0)];
        assert_eq!(invalid_field(&request), "pifs");
    }

    #[test]
    fn rejects_bond_without_mode() {
        let mut request = CreateNetworkRequest::new("storage");
        request.bonded = true;
        request.pifs = vec![pif(0), pif(1)];
        assert_eq!(invalid_field(&request), "bond_mode");
    }

    #[test]
    fn rejects_duplicate_bond_members() {
        let mut request = CreateNetworkRequest::new("storage");
        request.bonded = true;
        request.bond_mode = Some(BondMode::BalanceSlb);
        request.pifs = vec![pif(0), pif(0)];
        assert_eq!(invalid_field(&request), "pifs");
    }

    #[test]
    fn rejects_vlan_with_bond() {
        let mut request = CreateNetworkRequest::new("storage");
        request.bonded = true;
        request.bond_mode = Some(BondMode::Lacp);
        request.vlan = Some(10);
        request.pifs = vec![pif(0), pif(1)];
        assert_eq!(invalid_field(&request), "vlan");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut request = CreateNetworkRequest::new("lan");
        request.mtu = 67;
        assert_eq!(invalid_field(&request), "mtu");

        let mut request = CreateNetworkRequest::new("lan");
        request.vlan = Some(4095);
        request.pifs = vec![pif(0)];
        assert_eq!(invalid_field(&request), "vlan");
    }

    #[test]
    fn rejects_vlan_without_exactly_one_pif() {
        let mut request = CreateNetworkRequest::new("lan");
        request.vlan = Some(20);
        assert_eq!(invalid_field(&request), "pifs");

        request.pifs = vec![pif(0), pif(1)];
        assert_eq!(invalid_field(&request), "pifs");
    }

    #[test]
    fn rejects_blank_label_and_stray_bond_mode() {
        assert_eq!(invalid_field(&CreateNetworkRequest::new("   ")), "name_label");

        let mut request = CreateNetworkRequest::new("lan");
        request.bond_mode = Some(BondMode::Lacp);
        assert_eq!(invalid_field(&request), "bond_mode");
    }

    #[test]
    fn bond_mode_wire_names() {
        assert_eq!(BondMode::BalanceSlb.to_string(), "balance-slb");
        assert_eq!("active-backup".parse::<BondMode>().unwrap(), BondMode::ActiveBackup);
        assert_eq!(serde_json::to_value(BondMode::Lacp).unwrap(), "lacp");
    }

    #[test]
    fn deserializes_with_defaults() {
        let request: CreateNetworkRequest =
            serde_json::from_value(serde_json::json!({"name_label": "lan"})).unwrap();
        assert_eq!(request.mtu, DEFAULT_MTU);
        assert!(!request.bonded);
        assert!(request.pifs.is_empty());
    }
}
