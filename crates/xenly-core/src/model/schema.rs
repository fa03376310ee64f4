// ── Per-class field schemas ──
//
// Known fields are coerced to their declared kind when a snapshot is
// applied. XML-RPC delivers 64-bit integers as strings, JSON-RPC as
// numbers; both land as `FieldValue::Int`. A value that cannot be coerced
// rejects the whole record. Fields not listed here pass through untyped.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{FieldValue, ObjectType, OpaqueRef};
use FieldKind::String as Str;
use FieldKind::{Bool, DateTime, Enum, Float, Int, Ref, RefSet, StringMap, StringSet};

/// Declared kind of a known field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    /// Reference to an object of the given class.
    Ref(ObjectType),
    RefSet(ObjectType),
    StringSet,
    StringMap,
    Enum,
    DateTime,
}

/// A snapshot value that does not match its declared kind.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{object_type}.{field}: expected {expected:?}, found {found}")]
pub struct SchemaError {
    pub object_type: ObjectType,
    pub field: String,
    pub expected: FieldKind,
    pub found: String,
}

type Fields = &'static [(&'static str, FieldKind)];

const POOL: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("master", Ref(ObjectType::Host)),
    ("default_SR", Ref(ObjectType::Sr)),
    ("other_config", StringMap),
    ("tags", StringSet),
];

const HOST: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("hostname", Str),
    ("address", Str),
    ("enabled", Bool),
    ("metrics", Ref(ObjectType::HostMetrics)),
    ("PIFs", RefSet(ObjectType::Pif)),
    ("resident_VMs", RefSet(ObjectType::Vm)),
    ("API_version_major", Int),
    ("API_version_minor", Int),
    ("software_version", StringMap),
    ("other_config", StringMap),
    ("tags", StringSet),
];

const HOST_METRICS: Fields = &[
    ("uuid", Str),
    ("memory_total", Int),
    ("memory_free", Int),
    ("live", Bool),
    ("last_updated", DateTime),
];

const VM: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("power_state", Enum),
    ("is_a_template", Bool),
    ("is_a_snapshot", Bool),
    ("is_control_domain", Bool),
    ("resident_on", Ref(ObjectType::Host)),
    ("metrics", Ref(ObjectType::VmMetrics)),
    ("guest_metrics", Ref(ObjectType::VmGuestMetrics)),
    ("VCPUs_max", Int),
    ("VCPUs_at_startup", Int),
    ("memory_static_max", Int),
    ("memory_dynamic_max", Int),
    ("VIFs", RefSet(ObjectType::Vif)),
    ("VBDs", RefSet(ObjectType::Vbd)),
    ("other_config", StringMap),
    ("tags", StringSet),
];

const VM_METRICS: Fields = &[
    ("uuid", Str),
    ("memory_actual", Int),
    ("VCPUs_number", Int),
    ("start_time", DateTime),
];

const VM_GUEST_METRICS: Fields = &[
    ("uuid", Str),
    ("os_version", StringMap),
    ("networks", StringMap),
    ("PV_drivers_detected", Bool),
    ("last_updated", DateTime),
];

const PIF: Fields = &[
    ("uuid", Str),
    ("device", Str),
    ("host", Ref(ObjectType::Host)),
    ("network", Ref(ObjectType::Network)),
    ("MAC", Str),
    ("MTU", Int),
    ("VLAN", Int),
    ("physical", Bool),
    ("management", Bool),
    ("currently_attached", Bool),
    ("bond_slave_of", Ref(ObjectType::Bond)),
    ("bond_master_of", RefSet(ObjectType::Bond)),
    ("VLAN_master_of", Ref(ObjectType::Vlan)),
    ("VLAN_slave_of", RefSet(ObjectType::Vlan)),
    ("metrics", Ref(ObjectType::PifMetrics)),
    ("IP", Str),
    ("ip_configuration_mode", Enum),
];

const PIF_METRICS: Fields = &[
    ("uuid", Str),
    ("device_name", Str),
    ("vendor_name", Str),
    ("carrier", Bool),
    ("speed", Int),
    ("duplex", Bool),
];

const NETWORK: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("bridge", Str),
    ("MTU", Int),
    ("PIFs", RefSet(ObjectType::Pif)),
    ("VIFs", RefSet(ObjectType::Vif)),
    ("other_config", StringMap),
    ("tags", StringSet),
];

const BOND: Fields = &[
    ("uuid", Str),
    ("master", Ref(ObjectType::Pif)),
    ("slaves", RefSet(ObjectType::Pif)),
    ("primary_slave", Ref(ObjectType::Pif)),
    ("mode", Enum),
    ("links_up", Int),
];

const VLAN: Fields = &[
    ("uuid", Str),
    ("tagged_PIF", Ref(ObjectType::Pif)),
    ("untagged_PIF", Ref(ObjectType::Pif)),
    ("tag", Int),
];

const SR: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("type", Str),
    ("content_type", Str),
    ("shared", Bool),
    ("physical_size", Int),
    ("physical_utilisation", Int),
    ("virtual_allocation", Int),
    ("VDIs", RefSet(ObjectType::Vdi)),
];

const VDI: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("name_description", Str),
    ("SR", Ref(ObjectType::Sr)),
    ("type", Enum),
    ("virtual_size", Int),
    ("physical_utilisation", Int),
    ("read_only", Bool),
    ("VBDs", RefSet(ObjectType::Vbd)),
];

const VBD: Fields = &[
    ("uuid", Str),
    ("VM", Ref(ObjectType::Vm)),
    ("VDI", Ref(ObjectType::Vdi)),
    ("device", Str),
    ("userdevice", Str),
    ("bootable", Bool),
    ("mode", Enum),
    ("type", Enum),
    ("currently_attached", Bool),
];

const VIF: Fields = &[
    ("uuid", Str),
    ("VM", Ref(ObjectType::Vm)),
    ("network", Ref(ObjectType::Network)),
    ("device", Str),
    ("MAC", Str),
    ("MTU", Int),
    ("currently_attached", Bool),
];

const TASK: Fields = &[
    ("uuid", Str),
    ("name_label", Str),
    ("status", Enum),
    ("progress", Float),
    ("created", DateTime),
    ("finished", DateTime),
    ("result", Str),
    ("error_info", StringSet),
    ("resident_on", Ref(ObjectType::Host)),
];

const MESSAGE: Fields = &[
    ("uuid", Str),
    ("name", Str),
    ("priority", Int),
    ("cls", Enum),
    ("obj_uuid", Str),
    ("timestamp", DateTime),
    ("body", Str),
];

/// Known fields of an object class.
pub fn fields_of(object_type: ObjectType) -> Fields {
    match object_type {
        ObjectType::Pool => POOL,
        ObjectType::Host => HOST,
        ObjectType::HostMetrics => HOST_METRICS,
        ObjectType::Vm => VM,
        ObjectType::VmMetrics => VM_METRICS,
        ObjectType::VmGuestMetrics => VM_GUEST_METRICS,
        ObjectType::Pif => PIF,
        ObjectType::PifMetrics => PIF_METRICS,
        ObjectType::Network => NETWORK,
        ObjectType::Bond => BOND,
        ObjectType::Vlan => VLAN,
        ObjectType::Sr => SR,
        ObjectType::Vdi => VDI,
        ObjectType::Vbd => VBD,
        ObjectType::Vif => VIF,
        ObjectType::Task => TASK,
        ObjectType::Message => MESSAGE,
    }
}

/// Declared kind of `field`, if the schema knows it.
pub fn kind_of(object_type: ObjectType, field: &str) -> Option<FieldKind> {
    fields_of(object_type)
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, kind)| *kind)
}

/// Coerce a wire value to `kind`. Returns `None` on mismatch.
pub fn coerce(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        Str | Enum | DateTime => value.as_str().map(|s| FieldValue::String(s.to_owned())),
        Int => match value {
            Value::Number(n) => n.as_i64().map(FieldValue::Int),
            Value::String(s) => s.trim().parse().ok().map(FieldValue::Int),
            _ => None,
        },
        Float => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Float),
            Value::String(s) => s.trim().parse().ok().map(FieldValue::Float),
            _ => None,
        },
        Bool => value.as_bool().map(FieldValue::Bool),
        Ref(_) => value
            .as_str()
            .map(|s| FieldValue::Ref(OpaqueRef::new(s))),
        RefSet(_) => collect_list(value, |v| v.as_str().map(|s| FieldValue::Ref(OpaqueRef::new(s)))),
        StringSet => collect_list(value, |v| v.as_str().map(|s| FieldValue::String(s.to_owned()))),
        StringMap => {
            let map = value.as_object()?;
            map.iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), FieldValue::String(s.to_owned())))
                })
                .collect::<Option<BTreeMap<_, _>>>()
                .map(FieldValue::Map)
        }
    }
}

fn collect_list(value: &Value, item: impl Fn(&Value) -> Option<FieldValue>) -> Option<FieldValue> {
    value
        .as_array()?
        .iter()
        .map(item)
        .collect::<Option<Vec<_>>>()
        .map(FieldValue::List)
}

/// Short description of a wire value for error messages.
pub(crate) fn describe(value: &Value) -> String {
    let text = value.to_string();
    if text.len() > 64 {
        let cut = (0..=64).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}…", &text[..cut])
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ints_accept_numbers_and_strings() {
        assert_eq!(coerce(Int, &json!(1500)), Some(FieldValue::Int(1500)));
        assert_eq!(
            coerce(Int, &json!("17179869184")),
            Some(FieldValue::Int(17_179_869_184))
        );
        assert_eq!(coerce(Int, &json!("-1")), Some(FieldValue::Int(-1)));
        assert_eq!(coerce(Int, &json!("lots")), None);
        assert_eq!(coerce(Int, &json!(true)), None);
    }

    #[test]
    fn refs_keep_null_reference() {
        assert_eq!(
            coerce(Ref(ObjectType::Bond), &json!("OpaqueRef:NULL")),
            Some(FieldValue::Ref(OpaqueRef::null()))
        );
    }

    #[test]
    fn string_maps_require_string_values() {
        assert!(coerce(StringMap, &json!({"a": "b"})).is_some());
        assert!(coerce(StringMap, &json!({"a": 1})).is_none());
        assert!(coerce(StringMap, &json!([])).is_none());
    }

    #[test]
    fn ref_sets_coerce_items() {
        let v = coerce(RefSet(ObjectType::Pif), &json!(["OpaqueRef:a", "OpaqueRef:b"])).unwrap_or(FieldValue::Null);
        assert_eq!(v.as_list().map(<[FieldValue]>::len), Some(2));
        assert!(coerce(RefSet(ObjectType::Pif), &json!(["OpaqueRef:a", 3])).is_none());
    }

    #[test]
    fn kind_lookup() {
        assert_eq!(kind_of(ObjectType::Pif, "VLAN"), Some(Int));
        assert_eq!(kind_of(ObjectType::Pif, "metrics"), Some(Ref(ObjectType::PifMetrics)));
        assert_eq!(kind_of(ObjectType::Pif, "nonexistent"), None);
    }
}
