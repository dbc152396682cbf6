use std::collections::BTreeMap;

use http_exec::config::{CommandConfig, ConfigFile, RawConfigFile, ServerSection};
use http_exec::types::LifecycleEvent;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                server: ServerSection::default(),
                command: BTreeMap::new(),
            },
        }
    }

    pub fn with_command(mut self, name: &str, command: CommandConfig) -> Self {
        self.config.command.insert(name.to_string(), command);
        self
    }

    pub fn default_timeout(mut self, timeout: &str) -> Self {
        self.config.server.default_timeout = timeout.to_string();
        self
    }

    pub fn grace_period(mut self, grace: &str) -> Self {
        self.config.server.grace_period = grace.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `CommandConfig`. Starts as a route-scoped, foreground command.
pub struct CommandConfigBuilder {
    command: CommandConfig,
}

impl CommandConfigBuilder {
    pub fn new(executable: &str) -> Self {
        Self {
            command: CommandConfig {
                executable: executable.to_string(),
                ..CommandConfig::default()
            },
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: &str) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.command.dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.command.timeout = Some(timeout.to_string());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.command.path = Some(path.to_string());
        self
    }

    pub fn route_scoped(mut self, val: bool) -> Self {
        self.command.route_scoped = val;
        self
    }

    pub fn at(mut self, event: LifecycleEvent) -> Self {
        self.command.at.push(event);
        self
    }

    pub fn foreground(mut self, val: bool) -> Self {
        self.command.foreground = val;
        self
    }

    pub fn pass_thru(mut self, val: bool) -> Self {
        self.command.pass_thru = val;
        self
    }

    pub fn build(self) -> CommandConfig {
        self.command
    }
}
