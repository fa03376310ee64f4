// xenly-api: Async Rust transport for the XAPI hypervisor management protocol (JSON-RPC + XML-RPC)

pub mod error;
pub mod event;
pub mod fault;
pub mod jsonrpc;
pub mod message;
pub mod transport;
pub mod xmlrpc;

pub use error::Error;
pub use event::{EventBatch, EventOperation, EventRecord};
pub use fault::XapiError;
pub use message::{RpcRequest, RpcResult};
pub use transport::{Encoding, PoolConfig, TlsMode, Transport, TransportConfig};
