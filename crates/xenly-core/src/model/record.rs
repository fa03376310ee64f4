// ── Object records ──

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::schema::{self, SchemaError};
use super::{FieldValue, ObjectType, OpaqueRef};

/// One remote object as last delivered by the event feed.
///
/// Records are immutable once in the cache; an update replaces the whole
/// `Arc<ObjectRecord>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub reference: OpaqueRef,
    pub object_type: ObjectType,
    pub fields: BTreeMap<String, FieldValue>,
}

impl ObjectRecord {
    pub fn new(
        object_type: ObjectType,
        reference: OpaqueRef,
        fields: BTreeMap<String, FieldValue>,
    ) -> Self {
        Self {
            reference,
            object_type,
            fields,
        }
    }

    /// Build a record from a wire snapshot, validating known fields.
    pub fn from_snapshot(
        object_type: ObjectType,
        reference: OpaqueRef,
        snapshot: &Value,
    ) -> Result<Self, SchemaError> {
        let Value::Object(map) = snapshot else {
            return Err(SchemaError {
                object_type,
                field: String::new(),
                expected: schema::FieldKind::StringMap,
                found: schema::describe(snapshot),
            });
        };

        let mut fields = BTreeMap::new();
        for (name, value) in map {
            let coerced = match schema::kind_of(object_type, name) {
                Some(kind) => schema::coerce(kind, value).ok_or_else(|| SchemaError {
                    object_type,
                    field: name.clone(),
                    expected: kind,
                    found: schema::describe(value),
                })?,
                None => FieldValue::from_json(value),
            };
            fields.insert(name.clone(), coerced);
        }

        Ok(Self::new(object_type, reference, fields))
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn int_field(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_int)
    }

    /// Non-null reference stored in `field`.
    pub fn ref_field(&self, field: &str) -> Option<&OpaqueRef> {
        self.get(field).and_then(FieldValue::as_ref_value)
    }

    /// Non-null references stored in a ref-set `field`.
    pub fn refs_field(&self, field: &str) -> Vec<&OpaqueRef> {
        self.get(field)
            .and_then(FieldValue::as_list)
            .map(|items| items.iter().filter_map(FieldValue::as_ref_value).collect())
            .unwrap_or_default()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.str_field("uuid")
    }

    pub fn name_label(&self) -> Option<&str> {
        self.str_field("name_label")
    }

    /// Best human-readable name: `name_label`, then `device`, then the reference.
    pub fn display_name(&self) -> &str {
        self.name_label()
            .filter(|s| !s.is_empty())
            .or_else(|| self.str_field("device"))
            .unwrap_or_else(|| self.reference.as_str())
    }

    /// Render back to a JSON object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.fields).unwrap_or(Value::Null)
    }
}
