//! Configuration Management
//!
//! Two layers: a persistent JSON file with engine defaults, and the
//! environment-sourced boundary settings consumed by bootstrap and sinks.

use crate::cloud::HttpSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 16;
pub const DEFAULT_QUEUE_SIZE: usize = 64;
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_REGION: &str = "us-east-1";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Provider bridge endpoint
    #[serde(default)]
    pub bridge_url: Option<String>,
    /// Worker pool size
    #[serde(default)]
    pub workers: Option<usize>,
    /// Bounded work queue capacity
    #[serde(default)]
    pub queue_size: Option<usize>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    /// Retries per provider call
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Default JSON lines output file
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tagsweep").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Get effective bridge endpoint (CLI > env > config)
    pub fn effective_bridge_url(&self, env: &Environment) -> Option<String> {
        env.bridge_url.clone().or_else(|| self.bridge_url.clone())
    }

    pub fn effective_workers(&self) -> usize {
        self.workers.filter(|n| *n > 0).unwrap_or(DEFAULT_WORKERS)
    }

    pub fn effective_queue_size(&self) -> usize {
        self.queue_size.filter(|n| *n > 0).unwrap_or(DEFAULT_QUEUE_SIZE)
    }

    /// Timeouts and retries for provider calls
    pub fn http_settings(&self) -> HttpSettings {
        let defaults = HttpSettings::default();
        HttpSettings {
            connect_timeout: self
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            read_timeout: self
                .read_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.read_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
        }
    }
}

/// Persistence store connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub endpoint: String,
    pub name: String,
    pub user: String,
    pub port: u16,
}

impl DatabaseSettings {
    /// Postgres connection URL with the given password
    pub fn connection_url(&self, password: &str) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(password),
            self.endpoint,
            self.port,
            self.name
        )
    }
}

/// Environment-sourced boundary settings
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub region: Option<String>,
    pub module_bucket: Option<String>,
    pub bridge_url: Option<String>,
    pub db_endpoint: Option<String>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_port: Option<u16>,
}

impl Environment {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through a lookup function
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            region: non_empty("AWS_REGION"),
            module_bucket: non_empty("MODULE_BUCKET"),
            bridge_url: non_empty("TAGSWEEP_BRIDGE_URL"),
            db_endpoint: non_empty("DB_ENDPOINT"),
            db_name: non_empty("DB_NAME"),
            db_user: non_empty("DB_USER"),
            db_port: non_empty("DB_PORT").and_then(|p| p.parse().ok()),
        }
    }

    /// Home region for boundary calls
    pub fn effective_region(&self) -> String {
        self.region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    /// Persistence settings, if the environment declares them
    pub fn database(&self) -> Result<DatabaseSettings> {
        Ok(DatabaseSettings {
            endpoint: self.db_endpoint.clone().context("DB_ENDPOINT is not set")?,
            name: self.db_name.clone().context("DB_NAME is not set")?,
            user: self.db_user.clone().context("DB_USER is not set")?,
            port: self.db_port.unwrap_or(DEFAULT_DB_PORT),
        })
    }
}
