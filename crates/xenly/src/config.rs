//! CLI flag overlay on top of `xenly_config` profiles.
//!
//! Core never sees these types -- it receives a pre-built `ConnectionConfig`.

use std::time::Duration;

use secrecy::SecretString;

use xenly_config::{Config, Profile};
use xenly_core::{ConnectionConfig, Credentials, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `ConnectionConfig` from the config file, profile, and CLI
/// overrides (flag > env > profile > defaults).
pub fn build_connection_config(global: &GlobalOpts) -> Result<ConnectionConfig, CliError> {
    let cfg = xenly_config::load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut config = match cfg.profiles.get(&profile_name) {
        Some(profile) => resolve_profile(profile, &profile_name, global, &cfg)?,
        None if global.profile.is_some() => {
            let available: Vec<_> = cfg.profiles.keys().cloned().collect();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        // No profile -- build from CLI flags / env vars alone
        None => from_flags(global, &profile_name, &cfg)?,
    };

    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn resolve_profile(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<ConnectionConfig, CliError> {
    // A password flag also satisfies the profile's credential chain.
    let mut profile = profile.clone();
    if global.password.is_some() {
        profile.password.clone_from(&global.password);
    }
    let mut config =
        xenly_config::profile_to_connection_config(&profile, profile_name, &cfg.defaults)?;

    if let Some(ref url) = global.url {
        config.url = parse_url(url)?;
    }
    if let Some(ref username) = global.username {
        config.credentials.username.clone_from(username);
    }
    if let Some(ref password) = global.password {
        config.credentials.password = SecretString::from(password.clone());
    }
    Ok(config)
}

fn from_flags(global: &GlobalOpts, profile_name: &str, cfg: &Config) -> Result<ConnectionConfig, CliError> {
    let url_str = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
        path: xenly_config::config_path().display().to_string(),
    })?;
    let url = parse_url(url_str)?;

    let password = global.password.clone().ok_or_else(|| CliError::NoCredentials {
        profile: profile_name.into(),
    })?;
    let username = global.username.clone().unwrap_or_else(|| "root".into());

    let mut config = ConnectionConfig::new(url, Credentials::new(username, password));
    config.tls = if cfg.defaults.insecure {
        TlsVerification::DangerAcceptInvalid
    } else {
        TlsVerification::SystemDefaults
    };
    config.timeout = Duration::from_secs(cfg.defaults.timeout);
    config.event_wait = Duration::from_secs(cfg.defaults.event_wait);
    Ok(config)
}

fn parse_url(url: &str) -> Result<url::Url, CliError> {
    url.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {url}"),
    })
}
