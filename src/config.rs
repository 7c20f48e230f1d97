//! Configuration loading and management.

use crate::db::pagination::PageLimits;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file looked up when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "taskdesk/config.yaml";

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Listener and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("taskdesk/tasks.db")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of issued bearer tokens.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
        }
    }
}

fn default_token_ttl() -> i64 {
    3600 // 1 hour
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_per_page")]
    pub default_per_page: u32,

    #[serde(default = "default_max_per_page")]
    pub max_per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_per_page() -> u32 {
    10
}

fn default_max_per_page() -> u32 {
    100
}

impl PaginationConfig {
    pub fn limits(&self) -> PageLimits {
        let max_per_page = self.max_per_page.max(1);
        PageLimits {
            default_per_page: self.default_per_page.clamp(1, max_per_page),
            max_per_page,
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `explicit` if given, else from [`DEFAULT_CONFIG_PATH`] when it
    /// exists, else defaults. Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `TASKDESK_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("TASKDESK_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(host) = lookup("TASKDESK_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("TASKDESK_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid TASKDESK_PORT"),
            }
        }

        if let Some(ttl) = lookup("TASKDESK_TOKEN_TTL") {
            match ttl.parse() {
                Ok(ttl) => self.auth.token_ttl_seconds = ttl,
                Err(_) => tracing::warn!(value = %ttl, "Ignoring invalid TASKDESK_TOKEN_TTL"),
            }
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
