// src/spec.rs

//! Immutable description of a command, built once from its config section.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::CommandConfig;
use crate::duration::parse_duration_ms;
use crate::errors::{HttpExecError, Result, ValidationError};
use crate::placeholder;
use crate::types::LifecycleEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    /// Already resolved; never contains placeholders.
    pub executable: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Signed milliseconds; `0` means no limit, negative fails validation.
    pub timeout_ms: i64,
    pub route_scoped: bool,
    pub at: Vec<LifecycleEvent>,
    pub foreground: bool,
    pub pass_thru: bool,
    pub path: Option<String>,
}

impl CommandSpec {
    /// Build a spec from a config section.
    ///
    /// `default_timeout_ms` applies when the section has no `timeout`.
    /// Only `{env.*}` placeholders may appear in `executable`; they are
    /// resolved here, once.
    pub fn build(name: &str, cfg: &CommandConfig, default_timeout_ms: i64) -> Result<Self> {
        let executable = placeholder::resolve(&cfg.executable, None).map_err(|e| {
            HttpExecError::ConfigError(format!("command '{name}': executable: {e}"))
        })?;

        let timeout_ms = match cfg.timeout.as_deref() {
            Some(raw) => parse_duration_ms(raw).map_err(|e| {
                HttpExecError::ConfigError(format!("command '{name}' has invalid timeout: {e}"))
            })?,
            None => default_timeout_ms,
        };

        let mut at: Vec<LifecycleEvent> = Vec::new();
        for event in cfg.at.iter() {
            if !at.contains(event) {
                at.push(*event);
            }
        }

        Ok(Self {
            name: name.to_string(),
            executable: executable.trim().to_string(),
            args: cfg.args.clone(),
            dir: cfg.dir.clone(),
            env: cfg.env.clone(),
            timeout_ms,
            route_scoped: cfg.route_scoped,
            at,
            foreground: cfg.foreground,
            pass_thru: cfg.pass_thru,
            path: cfg.path.clone(),
        })
    }

    /// Check the invariants a spec needs before it may run.
    ///
    /// Pure: calling it any number of times has no side effects.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.executable.is_empty() {
            return Err(ValidationError::EmptyExecutable);
        }
        if self.timeout_ms < 0 {
            return Err(ValidationError::InvalidTimeout(self.timeout_ms));
        }
        if self.route_scoped && !self.at.is_empty() {
            return Err(ValidationError::EventsOnRoute);
        }
        Ok(())
    }

    /// `None` when the command may run without a limit.
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn is_route(&self) -> bool {
        self.route_scoped
    }

    pub fn runs_at(&self, event: LifecycleEvent) -> bool {
        self.at.contains(&event)
    }
}
