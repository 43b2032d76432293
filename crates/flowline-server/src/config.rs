//! Configuration for the Flowline Server
//!
//! Values come from built-in defaults, then an optional `flowline.toml`,
//! then `FLOWLINE_`-prefixed environment variables.

use config::{Config, Environment, File, FileFormat};
use flowline_monitoring::{LogFormat, MonitoringConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

/// Where the per-flow lock lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    /// Process-local mutex table
    Memory,
    /// Postgres advisory locks on the state store database
    Postgres,
    /// Redis `SET NX PX` keys
    Redis,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub bind_address: String,

    /// `memory://` or a `postgres://` connection string
    pub state_store_url: String,

    /// Maximum pooled database connections
    pub state_store_max_connections: u32,

    /// Lock backend
    pub lock_backend: LockBackend,

    /// Redis URL, required by the redis lock backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Bound on waiting for the per-flow lock
    pub lock_timeout_ms: u64,

    /// Log filter directive
    pub log_filter: String,

    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            state_store_url: "memory://".to_string(),
            state_store_max_connections: 5,
            lock_backend: LockBackend::Memory,
            redis_url: None,
            lock_timeout_ms: 5000,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `flowline.toml` (if present) and the environment
    pub fn load() -> ServerResult<Self> {
        let builder = Self::defaults()?
            .add_source(File::with_name("flowline").required(false))
            .add_source(Environment::with_prefix("FLOWLINE").try_parsing(true));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML text layered over the defaults
    pub fn from_toml(toml: &str) -> ServerResult<Self> {
        let config: ServerConfig = Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn defaults() -> ServerResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();
        Ok(Config::builder()
            .set_default("port", defaults.port as i64)?
            .set_default("bind_address", defaults.bind_address)?
            .set_default("state_store_url", defaults.state_store_url)?
            .set_default(
                "state_store_max_connections",
                defaults.state_store_max_connections as i64,
            )?
            .set_default("lock_backend", "memory")?
            .set_default("lock_timeout_ms", defaults.lock_timeout_ms as i64)?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("log_format", defaults.log_format.to_string())?)
    }

    /// Reject combinations that cannot be wired
    pub fn validate(&self) -> ServerResult<()> {
        if self.lock_timeout_ms == 0 {
            return Err(ServerError::ConfigError(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.lock_backend == LockBackend::Postgres && !self.uses_postgres() {
            return Err(ServerError::ConfigError(
                "The postgres lock backend requires a postgres state store".to_string(),
            ));
        }

        if self.lock_backend == LockBackend::Redis && self.redis_url.is_none() {
            return Err(ServerError::ConfigError(
                "redis_url is required by the redis lock backend".to_string(),
            ));
        }

        if self.lock_backend == LockBackend::Memory && self.uses_postgres() {
            warn!("In-memory flow lock with a shared database only serialises updates within this node");
        }

        Ok(())
    }

    /// Whether the state store is a Postgres database
    pub fn uses_postgres(&self) -> bool {
        self.state_store_url.starts_with("postgres://")
            || self.state_store_url.starts_with("postgresql://")
    }

    /// Lock wait bound
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Logging settings for the monitoring crate
    pub fn monitoring(&self) -> MonitoringConfig {
        MonitoringConfig {
            service_name: "flowline-server".to_string(),
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
        }
    }
}
