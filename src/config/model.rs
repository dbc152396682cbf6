// src/config/model.rs

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::LifecycleEvent;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// bind = "127.0.0.1:8080"
/// default_timeout = "10s"
/// grace_period = "2s"
///
/// [command.deploy]
/// executable = "/usr/local/bin/deploy"
/// args = ["--ref", "{http.request.uri.query.ref}"]
/// path = "/deploy"
///
/// [command.warmup]
/// executable = "echo"
/// args = ["ready"]
/// route_scoped = false
/// at = ["startup"]
/// ```
///
/// Unknown keys anywhere in the file are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Listener and process-control settings from `[server]`.
    #[serde(default)]
    pub server: ServerSection,

    /// All commands from `[command.<name>]`, keyed by name.
    #[serde(default)]
    pub command: BTreeMap<String, CommandConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Applied to commands that do not set `timeout`.
    ///
    /// `"none"` (or `"0s"`) disables the limit for those commands.
    #[serde(default = "default_timeout")]
    pub default_timeout: String,

    /// How long a process gets between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_timeout() -> String {
    "10s".to_string()
}

fn default_grace_period() -> String {
    "2s".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_timeout: default_timeout(),
            grace_period: default_grace_period(),
        }
    }
}

/// `[command.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandConfig {
    /// Program to run. `{env.*}` placeholders are resolved once at provision
    /// time; request placeholders are not allowed here.
    #[serde(default)]
    pub executable: String,

    /// Arguments, each of which may contain request placeholders.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory; the server's cwd if unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Extra environment merged over the inherited one. Values may contain
    /// request placeholders.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Duration string (`"30s"`, `"none"`). Falls back to
    /// `[server].default_timeout` when unset.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Request-path bound (default). Commands with `route_scoped = false` are
    /// registered application-wide.
    #[serde(default = "default_true")]
    pub route_scoped: bool,

    /// Lifecycle events at which a non-route command also runs.
    #[serde(default)]
    pub at: Vec<LifecycleEvent>,

    /// Wait for the process before answering (default). When false the
    /// response is sent as soon as the process has started.
    #[serde(default = "default_true")]
    pub foreground: bool,

    /// On success, hand the request on instead of writing the JSON body.
    #[serde(default)]
    pub pass_thru: bool,

    /// Request path that triggers this command.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            executable: String::new(),
            args: Vec::new(),
            dir: None,
            env: BTreeMap::new(),
            timeout: None,
            route_scoped: true,
            at: Vec::new(),
            foreground: true,
            pass_thru: false,
            path: None,
        }
    }
}

/// `[server]` after parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    /// Signed milliseconds; `0` means no limit.
    pub default_timeout_ms: i64,
    pub grace_period: Duration,
}

/// Validated configuration.
///
/// Build with `ConfigFile::try_from(raw)` (see `validate.rs`) so that the
/// invariants checked there always hold.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub command: BTreeMap<String, CommandConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        server: ServerSettings,
        command: BTreeMap<String, CommandConfig>,
    ) -> Self {
        Self { server, command }
    }
}
