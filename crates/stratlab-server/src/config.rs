//! Server configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! `STRATLAB_*` environment variables.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::{Lambda, Symbol, DEFAULT_BENCHMARK};
use stratlab_engine::EngineConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        message: String,
    },

    /// The configuration file is not valid TOML
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// A value is out of range or malformed
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Setting name
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// A connection string names an unsupported backend
    #[error("unsupported {key} '{url}'")]
    UnsupportedScheme {
        /// Setting name
        key: String,
        /// Connection string as given
        url: String,
    },
}

/// Message broker selected by `broker_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerUrl {
    /// In-process queue
    Memory,
}

/// Result store selected by `result_store_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    /// In-process store
    Memory,
    /// Embedded redb database at a path
    Redb(PathBuf),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Broker connection string
    #[serde(default = "default_memory_url")]
    pub broker_url: String,

    /// Result store connection string
    #[serde(default = "default_memory_url")]
    pub result_store_url: String,

    /// Retention of task records, in seconds
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,

    /// Benchmark used when a request does not name one
    #[serde(default = "default_benchmark")]
    pub default_benchmark: String,

    /// Shrinkage factor used when a request does not set one
    #[serde(default)]
    pub default_lambda: f64,

    /// Worker count; defaults to available parallelism
    pub workers: Option<usize>,

    /// Interval between expired-record sweeps, in seconds
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_memory_url() -> String {
    "memory://".to_string()
}

fn default_result_ttl_secs() -> u64 {
    86_400
}

fn default_benchmark() -> String {
    DEFAULT_BENCHMARK.to_string()
}

fn default_purge_interval_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            broker_url: default_memory_url(),
            result_store_url: default_memory_url(),
            result_ttl_secs: default_result_ttl_secs(),
            default_benchmark: default_benchmark(),
            default_lambda: 0.0,
            workers: None,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load the file if it exists, apply the process environment and
    /// validate the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `STRATLAB_*` overrides from `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("STRATLAB_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("STRATLAB_PORT") {
            self.port = parse_value("STRATLAB_PORT", &v)?;
        }
        if let Some(v) = lookup("STRATLAB_BROKER_URL") {
            self.broker_url = v;
        }
        if let Some(v) = lookup("STRATLAB_RESULT_STORE_URL") {
            self.result_store_url = v;
        }
        if let Some(v) = lookup("STRATLAB_RESULT_TTL_SECS") {
            self.result_ttl_secs = parse_value("STRATLAB_RESULT_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("STRATLAB_DEFAULT_BENCHMARK") {
            self.default_benchmark = v;
        }
        if let Some(v) = lookup("STRATLAB_DEFAULT_LAMBDA") {
            self.default_lambda = parse_value("STRATLAB_DEFAULT_LAMBDA", &v)?;
        }
        if let Some(v) = lookup("STRATLAB_WORKERS") {
            self.workers = Some(parse_value("STRATLAB_WORKERS", &v)?);
        }
        Ok(())
    }

    /// Check every setting without opening any backend.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.broker()?;
        self.result_store()?;
        self.engine_config()?;
        Ok(())
    }

    /// Socket address to listen on. `host` must be an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = parse_value("host", &self.host)?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The configured broker.
    pub fn broker(&self) -> Result<BrokerUrl, ConfigError> {
        match self.broker_url.trim() {
            "memory://" => Ok(BrokerUrl::Memory),
            other => Err(ConfigError::UnsupportedScheme {
                key: "broker_url".into(),
                url: other.to_string(),
            }),
        }
    }

    /// The configured result store.
    pub fn result_store(&self) -> Result<StoreUrl, ConfigError> {
        let url = self.result_store_url.trim();
        if url == "memory://" {
            return Ok(StoreUrl::Memory);
        }
        match url.strip_prefix("redb://") {
            Some(path) if !path.is_empty() => Ok(StoreUrl::Redb(PathBuf::from(path))),
            _ => Err(ConfigError::UnsupportedScheme {
                key: "result_store_url".into(),
                url: url.to_string(),
            }),
        }
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let default_benchmark =
            Symbol::new(&self.default_benchmark).map_err(|e| ConfigError::InvalidValue {
                key: "default_benchmark".into(),
                message: e.to_string(),
            })?;
        let default_lambda =
            Lambda::new(self.default_lambda).map_err(|e| ConfigError::InvalidValue {
                key: "default_lambda".into(),
                message: e.to_string(),
            })?;
        if self.result_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "result_ttl_secs".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers".into(),
                message: "must be at least 1".into(),
            });
        }

        let mut config = EngineConfig {
            name: "stratlab-server".to_string(),
            default_benchmark,
            default_lambda,
            result_ttl: Duration::from_secs(self.result_ttl_secs),
            purge_interval: Duration::from_secs(self.purge_interval_secs.max(1)),
            ..EngineConfig::default()
        };
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        Ok(config)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}
