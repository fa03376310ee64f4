//! Shared helpers for command handlers.

use std::time::Duration;

use xenly_core::{Connection, ConnectionConfig, ObjectType};

use crate::error::CliError;

/// Parse a class name the way the event feed reports it (case-insensitive).
pub fn parse_object_type(name: &str) -> Result<ObjectType, CliError> {
    name.parse().map_err(|_| CliError::Validation {
        field: "object type".into(),
        reason: format!(
            "unknown class '{name}'. Known classes: {}",
            ObjectType::all()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    })
}

/// Connect with the event watcher caching `types`, and wait until each
/// class has been enumerated once.
///
/// The wait shares the call timeout; the connection is closed again if
/// it runs out.
pub async fn connect_cached(
    mut config: ConnectionConfig,
    types: &[ObjectType],
) -> Result<Connection, CliError> {
    config.watch_events = true;
    config.tracked_types = types.to_vec();
    let timeout = config.timeout;

    let connection = Connection::new(config)?;
    connection.connect().await?;

    if let Err(err) = wait_all(&connection, types, timeout).await {
        connection.close().await;
        return Err(err);
    }
    Ok(connection)
}

async fn wait_all(
    connection: &Connection,
    types: &[ObjectType],
    timeout: Duration,
) -> Result<(), CliError> {
    let populated = async {
        for &object_type in types {
            connection.wait_populated(object_type).await?;
        }
        Ok::<_, CliError>(())
    };
    tokio::time::timeout(timeout, populated)
        .await
        .map_err(|_| CliError::Timeout {
            seconds: timeout.as_secs(),
        })?
}
