//! Engine configuration.
//!
//! Configuration is loaded from a YAML file: the seed scope, engine
//! tuning knobs, and per-data-source settings (credentials, TTL and rate
//! overrides).

use chrono::Duration;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration for a discovery session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the graph database.
    #[serde(default)]
    pub dir: Option<std::path::PathBuf>,

    /// Seed scope for the session.
    #[serde(default)]
    pub scope: ScopeConfig,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Per-data-source settings.
    #[serde(default)]
    pub datasources: Vec<DataSourceConfig>,
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Returns the settings for a data source by name, case-insensitively.
    pub fn data_source(&self, name: &str) -> Option<&DataSourceConfig> {
        self.datasources
            .iter()
            .find(|ds| ds.name.eq_ignore_ascii_case(name))
    }

    /// Returns the freshness TTL for a data source.
    ///
    /// A per-source `ttl_minutes` override wins; an unconfigured source
    /// falls back to the engine default.
    pub fn ttl_for(&self, source_name: &str) -> Duration {
        let minutes = self
            .data_source(source_name)
            .and_then(|ds| ds.ttl_minutes)
            .unwrap_or(self.engine.default_ttl_minutes);
        Duration::minutes(minutes as i64)
    }
}

/// Seed scope: the assets the session is allowed to expand from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Seed registered domain names.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Seed netblocks in CIDR notation.
    #[serde(default)]
    pub netblocks: Vec<IpNet>,

    /// Seed autonomous system numbers.
    #[serde(default)]
    pub asns: Vec<u32>,

    /// Keywords that admit an otherwise out-of-scope name.
    #[serde(default)]
    pub allow: Vec<String>,

    /// Keywords that reject a name regardless of other rules.
    #[serde(default)]
    pub deny: Vec<String>,

    /// Maximum registration-edge depth for ancillary asset scoping.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    3
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Queue depth at which producers start blocking.
    #[serde(default = "default_queue_high_water")]
    pub queue_high_water: usize,

    /// Queue depth at which blocked producers resume.
    #[serde(default = "default_queue_low_water")]
    pub queue_low_water: usize,

    /// Number of concurrent event dispatches.
    #[serde(default = "default_max_in_flight_events")]
    pub max_in_flight_events: usize,

    /// Seconds of continuous idleness before quiescence is declared.
    #[serde(default = "default_quiescence_window_secs")]
    pub quiescence_window_secs: u64,

    /// Default freshness TTL for data sources without an override.
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: u64,

    /// Global cap on concurrent HTTP requests.
    #[serde(default = "default_max_concurrent_http")]
    pub max_concurrent_http: usize,

    /// Global cap on concurrent DNS lookups.
    #[serde(default = "default_max_concurrent_dns")]
    pub max_concurrent_dns: usize,

    /// Per-request timeout for external calls, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Maximum retries for transient external failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_queue_high_water() -> usize {
    4096
}

fn default_queue_low_water() -> usize {
    1024
}

fn default_max_in_flight_events() -> usize {
    32
}

fn default_quiescence_window_secs() -> u64 {
    5
}

fn default_ttl_minutes() -> u64 {
    1440
}

fn default_max_concurrent_http() -> usize {
    64
}

fn default_max_concurrent_dns() -> usize {
    128
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_high_water: default_queue_high_water(),
            queue_low_water: default_queue_low_water(),
            max_in_flight_events: default_max_in_flight_events(),
            quiescence_window_secs: default_quiescence_window_secs(),
            default_ttl_minutes: default_ttl_minutes(),
            max_concurrent_http: default_max_concurrent_http(),
            max_concurrent_dns: default_max_concurrent_dns(),
            http_timeout_secs: default_http_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Settings for a single external data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Source name; matches the plugin name.
    pub name: String,

    /// Freshness TTL override in minutes.
    #[serde(default)]
    pub ttl_minutes: Option<u64>,

    /// Credentials for the source. Credential-less sources ignore this.
    #[serde(default)]
    pub creds: Vec<Credential>,

    /// Requests-per-second override for the source's token bucket.
    #[serde(default)]
    pub rate: Option<u32>,
}

impl DataSourceConfig {
    /// Returns the non-empty API keys configured for this source.
    pub fn api_keys(&self) -> Vec<String> {
        self.creds
            .iter()
            .filter(|c| !c.apikey.is_empty())
            .map(|c| c.apikey.clone())
            .collect()
    }
}

/// A credential set for a data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credential {
    /// API key, if the source uses key auth.
    #[serde(default)]
    pub apikey: String,

    /// Username, if the source uses basic auth.
    #[serde(default)]
    pub username: String,

    /// Password, if the source uses basic auth.
    #[serde(default)]
    pub password: String,
}
