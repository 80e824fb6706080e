//! Store configuration: the JSON config file, pool tuning and connection settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tessera_common::{Result, TesseraError};
use tessera_validation::{check, schemas, SchemaReport, Value};
use tracing::warn;

/// Port used when the config file does not name one
pub const DEFAULT_PORT: &str = "27017";

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

/// Contents of the configuration file
///
/// ```json
/// { "serverURL": "localhost", "port": "27017", "dbName": "catalog",
///   "collections": { "products": "products_v2" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "serverURL", alias = "server_url")]
    pub server_url: String,

    #[serde(default = "default_port", alias = "server_port")]
    pub port: String,

    #[serde(rename = "dbName", alias = "db_name")]
    pub db_name: String,

    /// Logical collection name to physical collection name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub collections: BTreeMap<String, String>,

    #[serde(default)]
    pub pool: PoolSection,
}

impl Config {
    pub fn new(server_url: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            port: default_port(),
            db_name: db_name.into(),
            collections: BTreeMap::new(),
            pool: PoolSection::default(),
        }
    }

    /// Read, schema-check and parse a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TesseraError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Schema-check and parse a JSON config document
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let json: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| TesseraError::Config(format!("config is not valid JSON: {}", e)))?;

        let report = check(&Value::from(&json), schemas::config());
        if !report.ok {
            for message in &report.errors {
                warn!(%message, "config file is not valid");
            }
            return Err(TesseraError::Config(report.errors.join("; ")));
        }

        serde_json::from_value(json).map_err(|e| TesseraError::Config(e.to_string()))
    }

    /// Validate a config file without connecting anywhere
    pub fn check_file(path: impl AsRef<Path>) -> Result<SchemaReport> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let json: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(check(&Value::from(&json), schemas::config()))
    }

    /// `mongodb://serverURL:port/dbName`
    pub fn connection_url(&self) -> String {
        format!("mongodb://{}:{}/{}", self.server_url, self.port, self.db_name)
    }

    /// Physical collection behind a logical name; unmapped names pass through
    pub fn collection_name<'a>(&'a self, logical: &'a str) -> &'a str {
        self.collections
            .get(logical)
            .map(String::as_str)
            .unwrap_or(logical)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            url: self.connection_url(),
            database: self.db_name.clone(),
            pool: PoolConfig::from(&self.pool),
        }
    }
}

/// `pool` section of the config file; unset entries keep [`PoolConfig`] defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pool_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pool_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selection_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 0)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 10)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 10s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(0),
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("tessera".to_string()),
        }
    }
}

impl From<&PoolSection> for PoolConfig {
    fn from(section: &PoolSection) -> Self {
        let defaults = PoolConfig::default();
        Self {
            min_pool_size: section.min_pool_size.or(defaults.min_pool_size),
            max_pool_size: section.max_pool_size.or(defaults.max_pool_size),
            max_idle_time: section
                .max_idle_time_ms
                .map(Duration::from_millis)
                .or(defaults.max_idle_time),
            connect_timeout: section
                .connect_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.connect_timeout),
            server_selection_timeout: section
                .server_selection_timeout_ms
                .map(Duration::from_millis)
                .or(defaults.server_selection_timeout),
            app_name: section.app_name.clone().or(defaults.app_name),
        }
    }
}

/// Everything a connector needs to reach the store
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub url: String,
    pub database: String,
    pub pool: PoolConfig,
}
