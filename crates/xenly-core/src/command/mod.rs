// ── Composite operations ──
//
// Multi-call operations on top of `Connection::call`, with their typed
// request structs.

mod network;
pub mod requests;

pub use requests::{BondMode, CreateNetworkRequest, NetworkTopology};
