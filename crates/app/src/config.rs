//! Configuration loading
//!
//! Values come from an optional TOML file and are overridden by
//! `WORDARENA_*` environment variables. Credentials are checked before any
//! socket is opened.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Relay address used when none is configured
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:7340";

const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "wordarena.db";

/// Raw configuration, every key optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub relay_addr: Option<String>,
    pub app_key: Option<String>,
    pub app_secret: Option<String>,
    pub player_name: Option<String>,
    pub data_dir: Option<PathBuf>,
}

/// What a participant needs to reach a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub relay_addr: SocketAddr,
    pub app_key: String,
}

/// What the relay needs to sign channel credentials
#[derive(Clone, PartialEq, Eq)]
pub struct RelayCredentials {
    pub app_key: String,
    pub app_secret: String,
}

impl std::fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("app_key", &self.app_key)
            .finish_non_exhaustive()
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "wordarena", "wordarena")
        .ok_or_else(|| Error::Configuration("Could not determine home directory".into()))
}

impl Config {
    /// Load from the given file (which must exist) or the default location
    /// (which may be absent), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|e| {
                Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
            })?),
            None => {
                let default = project_dirs()?.config_dir().join(CONFIG_FILE);
                if default.exists() {
                    debug!(path = %default.display(), "Loading config file");
                    Some(std::fs::read_to_string(&default)?)
                } else {
                    None
                }
            }
        };
        Self::from_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Build from TOML content and an environment lookup
    pub fn from_sources(
        file: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config: Config = match file {
            Some(content) => toml::from_str(content)?,
            None => Config::default(),
        };

        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty("WORDARENA_RELAY_ADDR") {
            config.relay_addr = Some(v);
        }
        if let Some(v) = non_empty("WORDARENA_APP_KEY") {
            config.app_key = Some(v);
        }
        if let Some(v) = non_empty("WORDARENA_APP_SECRET") {
            config.app_secret = Some(v);
        }
        if let Some(v) = non_empty("WORDARENA_PLAYER_NAME") {
            config.player_name = Some(v);
        }
        if let Some(v) = non_empty("WORDARENA_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(v));
        }
        Ok(config)
    }

    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        let app_key = required(&self.app_key, "app_key", "WORDARENA_APP_KEY")?;
        let relay_addr = self.relay_addr()?;
        Ok(ClientCredentials {
            relay_addr,
            app_key,
        })
    }

    pub fn relay_credentials(&self) -> Result<RelayCredentials> {
        Ok(RelayCredentials {
            app_key: required(&self.app_key, "app_key", "WORDARENA_APP_KEY")?,
            app_secret: required(&self.app_secret, "app_secret", "WORDARENA_APP_SECRET")?,
        })
    }

    pub fn relay_addr(&self) -> Result<SocketAddr> {
        let raw = self.relay_addr.as_deref().unwrap_or(DEFAULT_RELAY_ADDR);
        raw.parse()
            .map_err(|_| Error::Configuration(format!("Invalid relay_addr: {}", raw)))
    }

    /// Name to join with; blank falls back to the default at join time
    pub fn player_name(&self) -> &str {
        self.player_name.as_deref().unwrap_or("")
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Location of the session store
    pub fn store_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(STORE_FILE))
    }
}

fn required(value: &Option<String>, key: &str, env: &str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Configuration(format!("Missing {} (set it in config.toml or {})", key, env)))
}
