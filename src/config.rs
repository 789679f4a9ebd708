//! Server configuration
//!
//! All fields have defaults, so an empty (or absent) TOML file yields a
//! working server. Command-line flags are applied on top in `main`.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Default listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:8888";

/// Default idle timeout (two minutes)
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 120_000;

/// Default maximum input line length in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 512;

/// Command syntax spoken by the server
///
/// Only one variant is active at a time; the other variant's command
/// forms are treated as public chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// `rename` and `to-<name>` followed by a prompted answer line
    #[default]
    Interactive,
    /// `rename-<name>` and `to-<name> <message>` on a single line
    Compact,
}

/// Runtime configuration for a `ChatServer`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind: SocketAddr,
    /// Inactivity window before a session is forced offline
    pub idle_timeout_ms: u64,
    /// Longest accepted input line, terminator excluded
    pub max_line_length: usize,
    /// Shortest allowed name (characters, inclusive)
    pub name_min_len: usize,
    /// Longest allowed name (characters, inclusive)
    pub name_max_len: usize,
    /// Command syntax variant
    pub protocol: ProtocolVariant,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8888)),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            name_min_len: 3,
            name_max_len: 20,
            protocol: ProtocolVariant::Interactive,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid("idle_timeout_ms must be positive".into()));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid("max_line_length must be positive".into()));
        }
        if self.name_min_len == 0 || self.name_min_len > self.name_max_len {
            return Err(ConfigError::Invalid(format!(
                "name length range {}..={} is empty",
                self.name_min_len, self.name_max_len
            )));
        }
        Ok(())
    }

    /// Idle timeout as a `Duration`
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
