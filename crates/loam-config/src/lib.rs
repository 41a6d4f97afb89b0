//! # Loam configuration
//!
//! Serde-backed configuration with three layers, later layers winning:
//! built-in defaults, an optional YAML file, and `LOAM_*` environment
//! variables. Every recognized option has an environment override so
//! containerized deployments need no file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File read failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse failure.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value failed validation.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Offending field path.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// DNS listen port (UDP and TCP).
    pub dns_port: u16,
    /// UDP request deadline, seconds.
    pub udp_timeout_secs: u64,
    /// TCP idle-connection timeout, seconds.
    pub tcp_timeout_secs: u64,
    /// Upper bound on concurrently processed queries.
    pub max_concurrent: usize,
    /// Grace period for in-flight requests at shutdown, seconds.
    pub shutdown_timeout_secs: u64,
    /// Interval between statistics log lines, seconds; 0 disables.
    pub stats_interval_secs: u64,

    /// L1 cache settings.
    pub l1: L1Config,
    /// L2 cache settings.
    pub l2: L2Config,
    /// Durable store settings.
    pub store: StoreConfig,
    /// Answer selection settings.
    pub selector: SelectorConfig,
    /// Wildcard engine settings.
    pub wildcard: WildcardConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// L1 (in-process) cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    /// Enable the in-process cache.
    pub enabled: bool,
    /// Maximum entries before LRU eviction.
    pub max_entries: usize,
    /// Background expiry sweep interval, seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            cleanup_interval_secs: 60,
        }
    }
}

/// L2 (shared remote) cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct L2Config {
    /// Enable the shared cache tier.
    pub enabled: bool,
    /// Server address, host:port.
    pub address: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Idle connections pre-dialed at startup.
    pub min_idle: usize,
    /// Dial timeout, seconds.
    pub dial_timeout_secs: u64,
    /// Key namespace prefix.
    pub key_prefix: String,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "localhost:6379".to_string(),
            pool_size: 10,
            min_idle: 3,
            dial_timeout_secs: 2,
            key_prefix: "dns:".to_string(),
        }
    }
}

/// Durable store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file path for the embedded backend.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "loam.redb".to_string(),
        }
    }
}

/// Answer selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// `round_robin` or `random`.
    pub policy: String,
    /// Round-robin bucket width, seconds.
    pub bucket_secs: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            policy: "round_robin".to_string(),
            bucket_secs: 5,
        }
    }
}

/// Wildcard engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WildcardConfig {
    /// Record types eligible for the wildcard fallback.
    pub types: Vec<String>,
    /// Path to a full public suffix list; empty uses the built-in set.
    pub psl_path: String,
}

impl Default for WildcardConfig {
    fn default() -> Self {
        Self {
            types: vec![
                "A".to_string(),
                "AAAA".to_string(),
                "CNAME".to_string(),
                "TXT".to_string(),
            ],
            psl_path: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Output format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_port: 5353,
            udp_timeout_secs: 5,
            tcp_timeout_secs: 10,
            max_concurrent: 1000,
            shutdown_timeout_secs: 30,
            stats_interval_secs: 60,
            l1: L1Config::default(),
            l2: L2Config::default(),
            store: StoreConfig::default(),
            selector: SelectorConfig::default(),
            wildcard: WildcardConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration: defaults, then the optional file, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Applies `LOAM_*` environment overrides.
    pub fn apply_env(&mut self) {
        env_parse("LOAM_DNS_PORT", &mut self.dns_port);
        env_parse("LOAM_UDP_TIMEOUT", &mut self.udp_timeout_secs);
        env_parse("LOAM_TCP_TIMEOUT", &mut self.tcp_timeout_secs);
        env_parse("LOAM_MAX_CONCURRENT", &mut self.max_concurrent);
        env_parse("LOAM_SHUTDOWN_TIMEOUT", &mut self.shutdown_timeout_secs);
        env_parse("LOAM_STATS_INTERVAL", &mut self.stats_interval_secs);

        env_parse("LOAM_L1_ENABLED", &mut self.l1.enabled);
        env_parse("LOAM_L1_MAX_ENTRIES", &mut self.l1.max_entries);
        env_parse("LOAM_L1_CLEANUP_INTERVAL", &mut self.l1.cleanup_interval_secs);

        env_parse("LOAM_L2_ENABLED", &mut self.l2.enabled);
        env_string("LOAM_L2_ADDRESS", &mut self.l2.address);
        env_parse("LOAM_L2_POOL_SIZE", &mut self.l2.pool_size);
        env_parse("LOAM_L2_MIN_IDLE", &mut self.l2.min_idle);
        env_parse("LOAM_L2_DIAL_TIMEOUT", &mut self.l2.dial_timeout_secs);
        env_string("LOAM_L2_KEY_PREFIX", &mut self.l2.key_prefix);

        env_string("LOAM_STORE_PATH", &mut self.store.path);

        env_string("LOAM_SELECTOR_POLICY", &mut self.selector.policy);
        env_parse("LOAM_SELECTOR_BUCKET", &mut self.selector.bucket_secs);

        if let Ok(types) = std::env::var("LOAM_WILDCARD_TYPES") {
            self.wildcard.types = types
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        env_string("LOAM_WILDCARD_PSL_PATH", &mut self.wildcard.psl_path);

        env_string("LOAM_LOG_LEVEL", &mut self.logging.level);
        env_string("LOAM_LOG_FORMAT", &mut self.logging.format);
    }

    /// Validates invariants that would otherwise fail at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.dns_port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dns_port",
                message: "port 0 is not a listenable port".to_string(),
            });
        }
        if self.udp_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "udp_timeout",
                message: "deadline cannot be zero".to_string(),
            });
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent",
                message: "must allow at least one in-flight query".to_string(),
            });
        }
        if self.l1.enabled && self.l1.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "l1.max_entries",
                message: "an enabled cache needs a non-zero bound".to_string(),
            });
        }
        if self.l2.enabled {
            if self.l2.address.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "l2.address",
                    message: "an enabled L2 needs an address".to_string(),
                });
            }
            if self.l2.pool_size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "l2.pool_size",
                    message: "an enabled L2 needs a non-zero pool".to_string(),
                });
            }
        }
        if self.store.path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.path",
                message: "store path cannot be empty".to_string(),
            });
        }
        match self.selector.policy.as_str() {
            "round_robin" | "random" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "selector.policy",
                    message: format!("{other:?} is not round_robin or random"),
                })
            }
        }
        if self.selector.bucket_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "selector.bucket_secs",
                message: "bucket cannot be zero".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.parse() {
            *slot = parsed;
        }
    }
}

fn env_string(key: &str, slot: &mut String) {
    if let Ok(value) = std::env::var(key) {
        if !value.is_empty() {
            *slot = value;
        }
    }
}
