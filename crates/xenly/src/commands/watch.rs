//! Live cache deltas.

use chrono::{SecondsFormat, Utc};
use futures_util::StreamExt;
use owo_colors::OwoColorize;

use xenly_core::{CacheDelta, Connection, ConnectionConfig, ConnectionState, ObjectType};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    mut config: ConnectionConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    config.watch_events = true;
    config.tracked_types = if args.types.is_empty() {
        ObjectType::all()
    } else {
        args.types
            .iter()
            .map(|t| util::parse_object_type(t))
            .collect::<Result<_, _>>()?
    };

    let connection = Connection::new(config)?;
    // Subscribe first so the initial enumeration shows up as additions.
    let mut deltas = connection.subscribe();
    let mut state = connection.state();
    connection.connect().await?;

    let color = output::should_color(&global.color);
    let result = loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Disconnected {
                    break Err(CliError::Disconnected {
                        reason: "session could not be re-established".into(),
                    });
                }
            }
            delta = deltas.next() => {
                let Some(delta) = delta else { break Ok(()) };
                match render_delta(&global.output, &delta, color) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(err) => break Err(err),
                }
            }
        }
    };

    connection.close().await;
    result
}

fn render_delta(format: &OutputFormat, delta: &CacheDelta, color: bool) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Table | OutputFormat::Plain => delta_line(delta, color),
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(delta)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(delta)?),
    })
}

/// `2026-01-01T12:00:00Z modified VM OpaqueRef:… web-01`
fn delta_line(delta: &CacheDelta, color: bool) -> String {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let kind = format!("{:<8}", delta.kind());
    let kind = if color {
        match delta {
            CacheDelta::Added { .. } => kind.green().to_string(),
            CacheDelta::Modified { .. } => kind.yellow().to_string(),
            CacheDelta::Removed { .. } => kind.red().to_string(),
        }
    } else {
        kind
    };
    let record = delta.record();
    format!(
        "{now} {kind} {} {} {}",
        record.object_type,
        record.reference,
        record.display_name()
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use xenly_core::{FieldValue, ObjectRecord, OpaqueRef};

    use super::*;

    fn added_vm() -> CacheDelta {
        let mut fields = BTreeMap::new();
        fields.insert("name_label".to_owned(), FieldValue::String("web-01".into()));
        CacheDelta::Added {
            record: Arc::new(ObjectRecord::new(
                ObjectType::Vm,
                OpaqueRef::new("OpaqueRef:v1"),
                fields,
            )),
        }
    }

    #[test]
    fn plain_line_names_the_object() {
        let line = delta_line(&added_vm(), false);
        assert!(line.ends_with(" added    VM OpaqueRef:v1 web-01"), "{line}");
    }

    #[test]
    fn json_line_is_tagged_by_kind() {
        let line = render_delta(&OutputFormat::Json, &added_vm(), false).map_err(|e| e.to_string());
        let Ok(line) = line else {
            panic!("render failed: {line:?}");
        };
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap_or_default();
        assert_eq!(value["kind"], "added");
        assert_eq!(value["record"]["reference"], "OpaqueRef:v1");
    }
}
