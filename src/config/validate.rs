// src/config/validate.rs

use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile, ServerSettings};
use crate::duration::{parse_duration, parse_duration_ms};
use crate::errors::{HttpExecError, Result};
use crate::server::HEALTH_PATH;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HttpExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_commands(&raw)?;
        let server = validate_server(&raw)?;
        validate_command_durations(&raw)?;
        validate_paths(&raw)?;
        Ok(ConfigFile::new_unchecked(server, raw.command))
    }
}

fn ensure_has_commands(cfg: &RawConfigFile) -> Result<()> {
    if cfg.command.is_empty() {
        return Err(HttpExecError::ConfigError(
            "config must contain at least one [command.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<ServerSettings> {
    let bind: SocketAddr = cfg.server.bind.parse().map_err(|e| {
        HttpExecError::ConfigError(format!(
            "[server].bind '{}' is not a socket address: {e}",
            cfg.server.bind
        ))
    })?;

    let default_timeout_ms = parse_duration_ms(&cfg.server.default_timeout)
        .map_err(|e| HttpExecError::ConfigError(format!("[server].default_timeout: {e}")))?;
    if default_timeout_ms < 0 {
        return Err(HttpExecError::ConfigError(format!(
            "[server].default_timeout must not be negative (got '{}')",
            cfg.server.default_timeout
        )));
    }

    let grace_period = parse_duration(&cfg.server.grace_period)
        .map_err(|e| HttpExecError::ConfigError(format!("[server].grace_period: {e}")))?;
    if grace_period.is_zero() {
        return Err(HttpExecError::ConfigError(
            "[server].grace_period must be > 0".to_string(),
        ));
    }

    Ok(ServerSettings {
        bind,
        default_timeout_ms,
        grace_period,
    })
}

// Sign is checked later by the command's own validation.
fn validate_command_durations(cfg: &RawConfigFile) -> Result<()> {
    for (name, command) in cfg.command.iter() {
        if let Some(ref timeout) = command.timeout {
            parse_duration_ms(timeout).map_err(|e| {
                HttpExecError::ConfigError(format!("command '{name}' has invalid timeout: {e}"))
            })?;
        }
    }
    Ok(())
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();

    for (name, command) in cfg.command.iter() {
        let Some(path) = command.path.as_deref() else {
            if command.route_scoped {
                return Err(HttpExecError::ConfigError(format!(
                    "route-scoped command '{name}' needs a `path`"
                )));
            }
            continue;
        };

        if !path.starts_with('/') {
            return Err(HttpExecError::ConfigError(format!(
                "command '{name}' has path '{path}' which does not start with '/'"
            )));
        }
        if path == HEALTH_PATH {
            return Err(HttpExecError::ConfigError(format!(
                "command '{name}' cannot use reserved path '{HEALTH_PATH}'"
            )));
        }
        if let Some(other) = seen.insert(path, name.as_str()) {
            return Err(HttpExecError::ConfigError(format!(
                "commands '{other}' and '{name}' share path '{path}'"
            )));
        }
    }
    Ok(())
}
