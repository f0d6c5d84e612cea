//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `ATSD_*` environment variable overrides.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::backend::AtsdConfig;
use crate::finder::tree::{default_aggregators, default_folders, default_periods};
use crate::finder::{AggregatorEntry, PeriodEntry, TreeSchema, ViewConfig, ViewSchema};
use crate::retention::{RetentionPolicy, RetentionSectionConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub atsd: AtsdSection,

    #[serde(default)]
    pub finder: FinderSection,

    /// Named view schemas
    #[serde(default)]
    pub views: BTreeMap<String, ViewConfig>,

    /// Retention sections, first match wins
    #[serde(default)]
    pub retention: Vec<RetentionSectionConfig>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// ATSD connection
#[derive(Debug, Clone, Deserialize)]
pub struct AtsdSection {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

fn default_url() -> String {
    "http://localhost:8088".to_string()
}

fn default_timeout() -> u64 {
    10_000
}

fn default_retries() -> u32 {
    3
}

impl Default for AtsdSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: String::new(),
            password: String::new(),
            timeout_ms: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

impl AtsdSection {
    pub fn client_config(&self) -> AtsdConfig {
        AtsdConfig {
            base_url: self.url.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            request_timeout_ms: self.timeout_ms,
            max_retries: self.max_retries,
        }
    }
}

/// Layout of the built-in tree and metadata caching
#[derive(Debug, Clone, Deserialize)]
pub struct FinderSection {
    #[serde(default = "default_folders")]
    pub entity_folders: Vec<String>,

    #[serde(default = "default_folders")]
    pub metric_folders: Vec<String>,

    /// Aggregators listed under `stats`, in display order
    #[serde(default = "default_aggregators")]
    pub aggregators: Vec<AggregatorEntry>,

    /// Periods listed under each aggregator
    #[serde(default = "default_periods")]
    pub periods: Vec<PeriodEntry>,

    /// Metadata cache TTL, 0 disables the cache
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_ms: i64,
}

fn default_cache_ttl() -> i64 {
    60_000
}

impl Default for FinderSection {
    fn default() -> Self {
        Self {
            entity_folders: default_folders(),
            metric_folders: default_folders(),
            aggregators: default_aggregators(),
            periods: default_periods(),
            cache_ttl_ms: default_cache_ttl(),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("atsd-finder").join("config.toml")),
            Some(PathBuf::from("/etc/atsd-finder/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // ATSD connection
        if let Ok(url) = std::env::var("ATSD_URL") {
            self.atsd.url = url;
        }
        if let Ok(username) = std::env::var("ATSD_USERNAME") {
            self.atsd.username = username;
        }
        if let Ok(password) = std::env::var("ATSD_PASSWORD") {
            self.atsd.password = password;
        }
        if let Ok(timeout) = std::env::var("ATSD_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.atsd.timeout_ms = t;
            }
        }

        if let Ok(ttl) = std::env::var("ATSD_CACHE_TTL_MS") {
            if let Ok(t) = ttl.parse() {
                self.finder.cache_ttl_ms = t;
            }
        }

        // API
        if let Ok(host) = std::env::var("ATSD_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("ATSD_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging
        if let Ok(level) = std::env::var("ATSD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("ATSD_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Tree layout from `[finder]`
    pub fn tree_schema(&self) -> Result<TreeSchema, ConfigError> {
        TreeSchema::new(
            self.finder.entity_folders.clone(),
            self.finder.metric_folders.clone(),
            self.finder.aggregators.clone(),
            self.finder.periods.clone(),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Validated `[views.*]` schemas
    pub fn view_schemas(&self) -> Result<Vec<ViewSchema>, ConfigError> {
        self.views
            .iter()
            .map(|(name, view)| {
                ViewSchema::new(name.clone(), view.clone())
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect()
    }

    /// Retention policy; malformed sections are logged and skipped
    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy::from_config(&self.retention)
    }

    /// Check everything that is fatal at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.atsd.url.is_empty() {
            return Err(ConfigError::Invalid("[atsd] url is empty".to_string()));
        }
        if self.finder.cache_ttl_ms < 0 {
            return Err(ConfigError::Invalid(
                "[finder] cache_ttl_ms cannot be negative".to_string(),
            ));
        }
        self.tree_schema()?;
        self.view_schemas()?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# ATSD Finder Configuration
#
# Environment variables override these settings:
# - ATSD_URL
# - ATSD_USERNAME
# - ATSD_PASSWORD
# - ATSD_TIMEOUT_MS
# - ATSD_CACHE_TTL_MS
# - ATSD_API_HOST
# - ATSD_API_PORT
# - ATSD_LOG_LEVEL
# - ATSD_LOG_FORMAT

[atsd]
# ATSD server URL
url = "http://localhost:8088"

# Basic auth credentials
username = ""
password = ""

# Per-request timeout (ms) and attempts per request
timeout_ms = 10000
max_retries = 3

[finder]
# Folder buckets under entities/ and metrics/; "_" collects the rest
entity_folders = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m",
                  "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y", "z", "_"]

# Metadata cache TTL (ms), 0 disables caching
cache_ttl_ms = 60000

# Aggregators listed under "stats"
# aggregators = [
#     { statistic = "avg", label = "Average" },
#     { statistic = "max", label = "Maximum" },
# ]

# Periods listed under each aggregator
# periods = [
#     { label = "1 min", count = 1, unit = "minute" },
#     { label = "1 hour", count = 1, unit = "hour" },
# ]

# Views: declarative namespaces, one level per path segment
# [views.hosts]
# levels = [
#     { type = "entity-folder", value = [{ expr = "nur*", label = "NUR" }] },
#     { type = "entity" },
#     { type = "metric", value = ["cpu_*"] },
#     { type = "period", leaf = true, value = [
#         { label = "raw", count = 0 },
#         { label = "5 min", count = 5, unit = "minute" },
#     ] },
# ]

# Retention: aggregation by look-back; first matching section wins
[[retention]]
tiers = [
    { max_age = "1h" },
    { max_age = "1d", aggregation = "avg:60:second" },
    { aggregation = "avg:1:hour" },
]

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8081

# Allowed CORS origins
cors_origins = []

# Request timeout in seconds
request_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_generated_config_loads() {
        let file = write_config(&generate_default_config());
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.atsd.url, "http://localhost:8088");
        assert_eq!(config.finder.entity_folders.len(), 27);
        assert_eq!(config.finder.aggregators.len(), 18);
        assert_eq!(config.retention.len(), 1);
        assert!(!config.retention_policy().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults_for_missing_sections() {
        let file = write_config("[atsd]\nurl = \"http://atsd:8088\"\n");
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.atsd.url, "http://atsd:8088");
        assert_eq!(config.atsd.max_retries, 3);
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.views.is_empty());
        assert!(config.retention_policy().is_empty());
    }

    #[test]
    fn test_views_and_tables() {
        let file = write_config(
            r#"
[finder]
entity_folders = ["nur", "_"]
aggregators = [{ statistic = "max", label = "Peak" }]
periods = [{ label = "5 min", count = 5, unit = "minute" }]

[views.hosts]
levels = [{ type = "entity" }, { type = "metric", leaf = true }]
"#,
        );
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.finder.entity_folders, vec!["nur", "_"]);
        assert_eq!(config.finder.periods[0].step_ms(), Some(300_000));
        let views = config.view_schemas().unwrap();
        assert_eq!(views[0].name(), "hosts");
        assert_eq!(views[0].depth(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_view_fails_validation() {
        let file = write_config("[views.empty]\nlevels = []\n");
        let config = Config::load(file.path()).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_raw_tree_period_fails_validation() {
        let file = write_config("[finder]\nperiods = [{ label = \"raw\", count = 0 }]\n");
        let config = Config::load(file.path()).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_statistic_is_parse_error() {
        let file = write_config("[finder]\naggregators = [{ statistic = \"mode\", label = \"M\" }]\n");
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/atsd-finder.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("ATSD_LOG_FORMAT", "json");
        let config = Config::from_env();
        std::env::remove_var("ATSD_LOG_FORMAT");

        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_client_config() {
        let section = AtsdSection {
            username: "admin".into(),
            ..AtsdSection::default()
        };
        let client = section.client_config();
        assert_eq!(client.username, "admin");
        assert_eq!(client.request_timeout_ms, 10_000);
    }
}
