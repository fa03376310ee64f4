// ── Field values ──
//
// A record field after schema coercion. Unknown fields are kept with a
// best-effort mapping from the wire value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::OpaqueRef;

const REF_PREFIX: &str = "OpaqueRef:";

/// Tagged value of a single record field.
///
/// Serializes untagged, so a record renders as the plain JSON object the
/// host sent (with 64-bit integers restored to numbers).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Ref(OpaqueRef),
    String(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Map a wire value with no schema information.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Value::String(s) if s.starts_with(REF_PREFIX) => Self::Ref(OpaqueRef::new(s.clone())),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Ref(r) => Some(r.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The reference, unless it is the null reference.
    pub fn as_ref_value(&self) -> Option<&OpaqueRef> {
        match self {
            Self::Ref(r) if !r.is_null() => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_wire_values_without_schema() {
        assert_eq!(FieldValue::from_json(&json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from_json(&json!(7)), FieldValue::Int(7));
        assert_eq!(FieldValue::from_json(&json!(1.5)), FieldValue::Float(1.5));
        assert_eq!(
            FieldValue::from_json(&json!("OpaqueRef:x")),
            FieldValue::Ref(OpaqueRef::new("OpaqueRef:x"))
        );
        assert_eq!(
            FieldValue::from_json(&json!("eth0")),
            FieldValue::String("eth0".into())
        );
    }

    #[test]
    fn null_ref_is_not_a_reference() {
        let v = FieldValue::from_json(&json!("OpaqueRef:NULL"));
        assert!(v.as_ref_value().is_none());
        assert_eq!(v.as_str(), Some("OpaqueRef:NULL"));
    }

    #[test]
    fn serializes_untagged() {
        let v = FieldValue::from_json(&json!({"a": [1, "b"], "c": true}));
        assert_eq!(serde_json::to_value(&v).ok(), Some(json!({"a": [1, "b"], "c": true})));
    }
}
