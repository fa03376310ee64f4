// ── Domain model ──
//
// Typed view of the remote object graph: classes, references, field
// values and the schema that validates snapshots.

mod field;
mod object_type;
mod opaque_ref;
mod record;
pub mod schema;

pub use field::FieldValue;
pub use object_type::ObjectType;
pub use opaque_ref::OpaqueRef;
pub use record::ObjectRecord;
pub use schema::{FieldKind, SchemaError};
