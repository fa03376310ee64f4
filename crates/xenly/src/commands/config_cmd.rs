//! Config subcommand handlers.

use std::io::BufRead;

use serde_json::Value;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = xenly_config::load_config_or_default();
            let mut value = serde_json::to_value(&cfg)?;
            redact_passwords(&mut value);
            let out = output::render_value(&global.output, &value)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&xenly_config::config_path().display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = xenly_config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!(
                    "No profiles configured. Add one to {}",
                    xenly_config::config_path().display()
                );
            } else {
                for name in cfg.profiles.keys() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let profile_name = match profile {
                Some(name) => name,
                None => config::active_profile_name(global, &xenly_config::load_config_or_default()),
            };

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let password = line.trim_end_matches(['\r', '\n']);
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "read an empty password from stdin".into(),
                });
            }

            xenly_config::store_password(&profile_name, password)?;
            eprintln!("Password for profile '{profile_name}' stored in the system keyring");
            Ok(())
        }
    }
}

/// Replace every plaintext profile password with a fixed marker.
fn redact_passwords(config: &mut Value) {
    let Some(profiles) = config.get_mut("profiles").and_then(Value::as_object_mut) else {
        return;
    };
    for profile in profiles.values_mut() {
        if let Some(password) = profile.get_mut("password") {
            if !password.is_null() {
                *password = Value::String(REDACTED.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn passwords_are_redacted() {
        let mut value = json!({
            "default_profile": "lab",
            "profiles": {
                "lab": {"url": "https://xcp.lab", "password": "hunter2"},
                "prod": {"url": "https://xcp.prod", "password": null},
            }
        });
        redact_passwords(&mut value);
        assert_eq!(value["profiles"]["lab"]["password"], REDACTED);
        assert!(value["profiles"]["prod"]["password"].is_null());
        assert_eq!(value["profiles"]["lab"]["url"], "https://xcp.lab");
    }
}
