//! Connection settings.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! url = "postgres://app@localhost/app"
//! command_timeout = 30
//! application_name = "billing"
//! ```
//!
//! or from `DATABASE_URL` and `FLUENT_SQL_COMMAND_TIMEOUT`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;

use crate::command::check_timeout;
use crate::connection_string::create_connection_options;
use crate::error::{CommandError, CommandResult};

pub const URL_VAR: &str = "DATABASE_URL";
pub const TIMEOUT_VAR: &str = "FLUENT_SQL_COMMAND_TIMEOUT";

/// Settings shared by every command built from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Default command timeout in seconds.
    #[serde(default)]
    pub command_timeout: Option<u32>,
    /// Reported to the server as `application_name`.
    #[serde(default)]
    pub application_name: Option<String>,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command_timeout: None,
            application_name: None,
        }
    }

    pub fn from_toml(content: &str) -> CommandResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CommandError::config(format!("invalid config: {e}")))?;
        if let Some(seconds) = config.command_timeout {
            check_timeout(i64::from(seconds))?;
        }
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> CommandResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CommandError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// `<config dir>/fluent-sql/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fluent-sql").join("config.toml"))
    }

    /// Read `DATABASE_URL` and `FLUENT_SQL_COMMAND_TIMEOUT`.
    pub fn from_env() -> CommandResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> CommandResult<Self> {
        let url = lookup(URL_VAR)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CommandError::config(format!("{URL_VAR} is not set")))?;
        let command_timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) => {
                let seconds = raw.trim().parse::<i64>().map_err(|_| {
                    CommandError::config(format!(
                        "{TIMEOUT_VAR} must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                Some(check_timeout(seconds)?)
            }
            None => None,
        };
        Ok(Self {
            url,
            command_timeout,
            application_name: None,
        })
    }

    /// Environment first, then the default config file.
    pub fn discover() -> CommandResult<Self> {
        if let Ok(config) = Self::from_env() {
            return Ok(config);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Err(CommandError::config(format!(
                "no {URL_VAR} set and no config file found"
            ))),
        }
    }

    pub fn connect_options(&self) -> CommandResult<PgConnectOptions> {
        let options = create_connection_options(&self.url)?;
        Ok(match &self.application_name {
            Some(name) => options.application_name(name),
            None => options,
        })
    }
}
