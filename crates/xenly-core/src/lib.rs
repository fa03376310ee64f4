// xenly-core: session management, live object cache and event watcher
// between xenly-api and consumers (CLI).

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod session;
pub mod store;
pub mod stream;
mod watcher;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{BondMode, CreateNetworkRequest, NetworkTopology};
pub use config::{ConnectionConfig, Credentials, ReconnectConfig, TlsVerification};
pub use connection::Connection;
pub use error::CoreError;
pub use session::{ConnectionState, Session};
pub use store::{CacheDelta, CacheEvent, ObjectCache};
pub use stream::{DeltaStream, EntityStream};

pub use model::{FieldKind, FieldValue, ObjectRecord, ObjectType, OpaqueRef, SchemaError};

// Remote faults and encodings surface unchanged from the transport crate.
pub use xenly_api::{Encoding, XapiError};
