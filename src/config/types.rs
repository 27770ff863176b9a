//! Application and package settings.

use crate::schema::ValidationErrors;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 5000;
pub const DEFAULT_API_BASE: &str = "/api";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Host application settings. Every field has a default.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub listen_host: String,
    pub listen_port: u16,
    pub debug: bool,
    pub workers: usize,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Prefix of every package route. Empty mounts packages at the root.
    #[serde(alias = "path")]
    pub api_base: String,
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            debug: false,
            workers: default_workers(),
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            api_base: DEFAULT_API_BASE.to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

/// Settings type of a package, resolved from its overrides and `<NAME>_` environment variables.
pub trait PackageConfig: DeserializeOwned + Send + Sync + 'static {
    /// Mount path to use when the package was loaded without one.
    fn path(&self) -> Option<&str> {
        None
    }

    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Settings every package understands.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BaseConfig {
    pub path: Option<String>,
    pub debug: bool,
}

impl PackageConfig for BaseConfig {
    fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
