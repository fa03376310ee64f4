//! Cached object listing and lookup.

use std::sync::Arc;

use serde_json::Value;
use tabled::Tabled;

use xenly_core::{ConnectionConfig, FieldValue, ObjectRecord, ObjectType, OpaqueRef};

use crate::cli::{GlobalOpts, ObjectArgs, ObjectsArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "REF")]
    reference: String,
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "NAME")]
    name: String,
}

fn row(record: &Arc<ObjectRecord>) -> ObjectRow {
    ObjectRow {
        reference: record.reference.to_string(),
        uuid: record.uuid().unwrap_or_default().to_owned(),
        name: record.display_name().to_owned(),
    }
}

pub async fn list(
    config: ConnectionConfig,
    args: ObjectsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let object_type = util::parse_object_type(&args.object_type)?;
    let connection = util::connect_cached(config, &[object_type]).await?;

    let cache = connection.cache();
    let records: Vec<Arc<ObjectRecord>> = if object_type == ObjectType::Vm && !args.all {
        cache.vms()
    } else {
        cache.list(object_type).to_vec()
    };
    connection.close().await;

    let out = output::render_list(&global.output, &records, row, |r| {
        r.reference.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(
    config: ConnectionConfig,
    args: ObjectArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let object_type = util::parse_object_type(&args.object_type)?;
    let connection = util::connect_cached(config, &[object_type]).await?;

    let cache = connection.cache();
    let found = cache
        .get(object_type, &OpaqueRef::new(args.id.as_str()))
        .or_else(|| cache.get_by_uuid(object_type, &args.id));
    connection.close().await;

    let record = found.ok_or_else(|| CliError::NotFound {
        resource_type: object_type.to_string(),
        identifier: args.id.clone(),
        list_command: format!("objects {object_type}"),
    })?;

    let out = output::render_single(&global.output, &record, |r| detail(r), |r| {
        r.reference.to_string()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(record: &ObjectRecord) -> String {
    let fields = std::iter::once(("ref", record.reference.to_string())).chain(
        record
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), field_text(value))),
    );
    output::render_fields(fields)
}

/// Strings print bare; everything else as compact JSON.
fn field_text(value: &FieldValue) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}
