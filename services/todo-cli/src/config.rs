//! Configuration types and loading
//!
//! Config precedence: CLI flags > env vars > config file > defaults.
//! The config file is optional unless it was named explicitly, in which case
//! a missing file is an error.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use todo_auth::DEFAULT_BASE_URL;

/// Config file looked up in the working directory when none is named
pub const DEFAULT_CONFIG_FILE: &str = "todo-client.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// API connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Session store location
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Session file; defaults under the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

/// A config file path and whether the user asked for it by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Env overlays: `TODO_API_URL` replaces `api.base_url`,
    /// `TODO_STORE_PATH` replaces `storage.path`.
    pub fn load(source: &ConfigPath) -> common::Result<Self> {
        let mut config = if source.explicit || source.path.exists() {
            let contents = std::fs::read_to_string(&source.path)?;
            toml::from_str::<Config>(&contents)?
        } else {
            Config::default()
        };

        if let Ok(url) = std::env::var("TODO_API_URL") {
            config.api.base_url = url;
        }
        if let Ok(path) = std::env::var("TODO_STORE_PATH") {
            config.storage.path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply a `--base-url` flag on top of file and env settings.
    pub fn override_base_url(&mut self, base_url: Option<String>) -> common::Result<()> {
        if let Some(url) = base_url {
            self.api.base_url = url;
        }
        self.validate()
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Session file path: configured, else `<data dir>/todo-client/session.json`.
    pub fn store_path(&self) -> common::Result<PathBuf> {
        if let Some(path) = &self.storage.path {
            return Ok(path.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("todo-client").join("session.json"))
            .ok_or_else(|| {
                common::Error::Config(
                    "no data directory found; set storage.path or TODO_STORE_PATH".into(),
                )
            })
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: p.to_path_buf(),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }
}
