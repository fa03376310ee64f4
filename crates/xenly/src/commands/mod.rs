//! Command dispatch: bridges CLI args -> core calls -> output formatting.

pub mod call;
pub mod config_cmd;
pub mod network;
pub mod objects;
pub mod util;
pub mod watch;

use xenly_core::ConnectionConfig;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a host-bound command to the appropriate handler.
///
/// Each handler owns its connection so it can pick the classes it needs
/// cached (or none at all).
pub async fn dispatch(
    cmd: Command,
    config: ConnectionConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Call(args) => call::handle(config, args, global).await,
        Command::Objects(args) => objects::list(config, args, global).await,
        Command::Object(args) => objects::get(config, args, global).await,
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Network(args) => network::handle(config, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
