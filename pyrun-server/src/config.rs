//! Configuration management for the pyrun server
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by
//! `PYRUN_*` environment variables. Command-line flags are applied last by
//! the binary.

use pyrun_sandbox::{
    InterpreterConfig, IsolationConfig, LimitPolicy, SchedulerConfig, WatchdogConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub limits: LimitPolicy,
    pub scheduler: SchedulerConfig,
    pub interpreter: InterpreterConfig,
    pub watchdog: WatchdogConfig,
    pub isolation: IsolationConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub max_request_bytes: usize,
    /// Answer CORS preflights for any origin
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_request_bytes: 256 * 1024,
            cors_allow_any: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset
    pub level: String,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Load configuration from file; a missing file is an error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Overlay `PYRUN_*` variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PYRUN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PYRUN_PORT") {
            self.server.port = parse_env("PYRUN_PORT", &port)?;
        }
        if let Some(program) = lookup("PYRUN_PYTHON") {
            self.interpreter.program = program;
        }
        if let Some(max) = lookup("PYRUN_MAX_CONCURRENT") {
            self.limits.max_concurrent_executions = parse_env("PYRUN_MAX_CONCURRENT", &max)?;
        }
        if let Some(wall) = lookup("PYRUN_MAX_WALL_TIME") {
            self.limits.max_wall_time = parse_duration_env("PYRUN_MAX_WALL_TIME", &wall)?;
        }
        if let Some(level) = lookup("PYRUN_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Fail fast on settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".to_string()));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_request_bytes must be positive".to_string(),
            ));
        }
        if self.interpreter.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter.program must not be empty".to_string(),
            ));
        }
        if self.interpreter.script_name.is_empty() || self.interpreter.script_name.contains('/') {
            return Err(ConfigError::Invalid(
                "interpreter.script_name must be a bare file name".to_string(),
            ));
        }
        if self.watchdog.sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "watchdog.sample_interval must be positive".to_string(),
            ));
        }
        if self.isolation.max_processes == 0 {
            return Err(ConfigError::Invalid(
                "isolation.max_processes must be positive".to_string(),
            ));
        }
        if let Some(account) = self.isolation.run_as {
            if account.uid == 0 || account.gid == 0 {
                return Err(ConfigError::Invalid(
                    "isolation.run_as must name an unprivileged account".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

fn parse_duration_env(var: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::Env {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
