//! Network command handlers.

use std::sync::Arc;

use tabled::Tabled;

use xenly_core::{
    BondMode, Connection, ConnectionConfig, CreateNetworkRequest, ObjectCache, ObjectRecord,
    ObjectType, OpaqueRef,
};

use crate::cli::{GlobalOpts, NetworkArgs, NetworkCommand, NetworkCreateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

/// Classes needed to find the pool master's interfaces.
const PIF_TYPES: [ObjectType; 4] = [
    ObjectType::Pool,
    ObjectType::Host,
    ObjectType::Pif,
    ObjectType::PifMetrics,
];

#[derive(Tabled)]
struct PifRow {
    #[tabled(rename = "REF")]
    reference: String,
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "INTERFACE")]
    label: String,
    #[tabled(rename = "MTU")]
    mtu: String,
}

pub async fn handle(
    config: ConnectionConfig,
    args: NetworkArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NetworkCommand::Pifs => pifs(config, global).await,
        NetworkCommand::Create(create) => create_network(config, create, global).await,
    }
}

async fn pifs(config: ConnectionConfig, global: &GlobalOpts) -> Result<(), CliError> {
    let connection = util::connect_cached(config, &PIF_TYPES).await?;
    let cache = Arc::clone(connection.cache());
    let pifs = cache.bondable_pifs();
    connection.close().await;

    let out = output::render_list(
        &global.output,
        &pifs,
        |pif| PifRow {
            reference: pif.reference.to_string(),
            device: pif.str_field("device").unwrap_or_default().to_owned(),
            label: cache.pif_label(pif),
            mtu: pif.int_field("MTU").map_or_else(String::new, |m| m.to_string()),
        },
        |pif| pif.str_field("device").unwrap_or_default().to_owned(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn create_network(
    config: ConnectionConfig,
    args: NetworkCreateArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut request = CreateNetworkRequest::new(args.name);
    request.name_description = args.description;
    request.mtu = args.mtu;
    request.vlan = args.vlan;
    request.bonded = args.bonded;
    request.bond_mode = args.bond_mode.as_deref().map(parse_bond_mode).transpose()?;

    // Device names need the interface cache; references can go straight through.
    let by_reference = args.pifs.iter().all(|p| p.starts_with("OpaqueRef:"));
    let network = if by_reference {
        request.pifs = args.pifs.iter().map(|p| OpaqueRef::new(p.as_str())).collect();
        // Fail before logging in.
        request.validate()?;
        Connection::oneshot(config, |conn| async move { conn.create_network(&request).await })
            .await?
    } else {
        let connection = util::connect_cached(config, &PIF_TYPES).await?;
        let result = async {
            request.pifs = resolve_pifs(connection.cache(), &args.pifs)?;
            Ok::<_, CliError>(connection.create_network(&request).await?)
        }
        .await;
        connection.close().await;
        result?
    };

    let out = output::render_single(
        &global.output,
        &network,
        ToString::to_string,
        ToString::to_string,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn parse_bond_mode(mode: &str) -> Result<BondMode, CliError> {
    mode.parse().map_err(|_| CliError::Validation {
        field: "bond-mode".into(),
        reason: format!("'{mode}' is not one of balance-slb, active-backup, lacp"),
    })
}

/// Map each identifier to a pool-master PIF by reference or device name.
fn resolve_pifs(cache: &ObjectCache, identifiers: &[String]) -> Result<Vec<OpaqueRef>, CliError> {
    let candidates: Vec<Arc<ObjectRecord>> = cache.bondable_pifs();
    identifiers
        .iter()
        .map(|id| {
            candidates
                .iter()
                .find(|pif| {
                    pif.reference.as_str() == id || pif.str_field("device") == Some(id.as_str())
                })
                .map(|pif| pif.reference.clone())
                .ok_or_else(|| CliError::NotFound {
                    resource_type: "PIF".into(),
                    identifier: id.clone(),
                    list_command: "network pifs".into(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use xenly_core::{CacheEvent, FieldValue};

    use super::*;

    fn record(object_type: ObjectType, reference: &str, fields: &[(&str, FieldValue)]) -> ObjectRecord {
        let fields: BTreeMap<String, FieldValue> = fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        ObjectRecord::new(object_type, OpaqueRef::new(reference), fields)
    }

    fn cache_with_master_pifs() -> ObjectCache {
        let cache = ObjectCache::new();
        let master = FieldValue::Ref(OpaqueRef::new("OpaqueRef:h1"));
        cache.apply(CacheEvent::Added(record(
            ObjectType::Pool,
            "OpaqueRef:p",
            &[("master", master.clone())],
        )));
        cache.apply(CacheEvent::Added(record(ObjectType::Host, "OpaqueRef:h1", &[])));
        for (reference, device) in [("OpaqueRef:e0", "eth0"), ("OpaqueRef:e1", "eth1")] {
            cache.apply(CacheEvent::Added(record(
                ObjectType::Pif,
                reference,
                &[
                    ("device", FieldValue::String(device.into())),
                    ("VLAN", FieldValue::Int(-1)),
                    ("host", master.clone()),
                    ("bond_slave_of", FieldValue::Ref(OpaqueRef::null())),
                ],
            )));
        }
        cache
    }

    #[test]
    fn pifs_resolve_by_device_or_reference() {
        let cache = cache_with_master_pifs();
        let resolved = resolve_pifs(&cache, &["eth1".to_owned(), "OpaqueRef:e0".to_owned()])
            .map_err(|e| e.to_string());
        assert_eq!(
            resolved,
            Ok(vec![OpaqueRef::new("OpaqueRef:e1"), OpaqueRef::new("OpaqueRef:e0")])
        );
    }

    #[test]
    fn unknown_device_is_not_found() {
        let cache = cache_with_master_pifs();
        let err = resolve_pifs(&cache, &["eth9".to_owned()]).err();
        assert!(matches!(err, Some(CliError::NotFound { ref identifier, .. }) if identifier == "eth9"));
    }

    #[test]
    fn bond_modes_parse_kebab_case() {
        assert!(matches!(parse_bond_mode("active-backup"), Ok(BondMode::ActiveBackup)));
        assert!(matches!(parse_bond_mode("round-robin"), Err(CliError::Validation { .. })));
    }
}
