//! Raw method calls.

use serde_json::Value;

use xenly_core::{Connection, ConnectionConfig};

use crate::cli::{CallArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    config: ConnectionConfig,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let params: Vec<Value> = args.args.iter().map(String::as_str).map(parse_arg).collect();
    let method = args.method;

    let result = Connection::oneshot(config, |conn| async move {
        conn.call(&method, &params).await
    })
    .await?;

    let out = output::render_value(&global.output, &result)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Arguments that parse as JSON are passed through as such; anything
/// else (bare refs, UUIDs, names) is sent as a string.
fn parse_arg(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn arguments_prefer_json() {
        assert_eq!(parse_arg("OpaqueRef:abc"), json!("OpaqueRef:abc"));
        assert_eq!(parse_arg("-1"), json!(-1));
        assert_eq!(parse_arg("true"), json!(true));
        assert_eq!(parse_arg(r#"{"a":"b"}"#), json!({"a": "b"}));
        assert_eq!(parse_arg(r#""42""#), json!("42"));
    }
}
