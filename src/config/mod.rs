//! Configuration loading for the dumpwatch service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `DUMPWATCH_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for every environment variable read by the loader.
pub const ENV_PREFIX: &str = "DUMPWATCH_";

/// Application configuration derived from `DUMPWATCH_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Confidence applied to device reports that omit one.
    #[serde(default = "default_report_default_confidence")]
    pub report_default_confidence: f64,
    /// Allowed CORS origins; empty allows any origin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

/// Live stream (SSE) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct StreamConfig {
    /// Interval between keep-alive comment frames (default: 15)
    ///
    /// Environment variable: `DUMPWATCH_STREAM_KEEP_ALIVE_SECONDS`
    #[serde(default = "default_stream_keep_alive_seconds")]
    pub keep_alive_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive_seconds: default_stream_keep_alive_seconds(),
        }
    }
}

impl StreamConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    /// Validate stream configuration bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keep_alive_seconds == 0 || self.keep_alive_seconds > 300 {
            return Err(ConfigError::InvalidKeepAlive {
                value: self.keep_alive_seconds,
            });
        }
        Ok(())
    }
}

/// List endpoint paging defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PaginationConfig {
    /// Page size when the caller gives none (default: 50)
    #[serde(default = "default_page_limit")]
    pub default_limit: usize,
    /// Upper clamp for caller-provided page sizes (default: 500)
    #[serde(default = "default_max_page_limit")]
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

impl PaginationConfig {
    /// Resolve a caller-provided limit: absent → default, negative → 0, above max → max.
    pub fn resolve_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            None => self.default_limit,
            Some(value) => usize::try_from(value.max(0))
                .unwrap_or(self.max_limit)
                .min(self.max_limit),
        }
    }

    /// Resolve a caller-provided offset: absent or negative → 0.
    pub fn resolve_offset(requested: Option<i64>) -> usize {
        requested
            .and_then(|value| usize::try_from(value.max(0)).ok())
            .unwrap_or(0)
    }

    /// Validate pagination bounds
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidPageLimits {
                default: self.default_limit,
                max: self.max_limit,
            });
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            report_default_confidence: default_report_default_confidence(),
            cors_allowed_origins: Vec::new(),
            stream: StreamConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a JSON representation suitable for startup logs.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        // No secrets in the current schema; origins may reveal internal hostnames.
        let mut config = self.clone();
        if !config.cors_allowed_origins.is_empty() && config.profile != "local" {
            config.cors_allowed_origins = vec!["[REDACTED]".to_string()];
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning the first violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::InvalidLogFormat {
                value: self.log_format.clone(),
            });
        }

        if !(0.0..=1.0).contains(&self.report_default_confidence) {
            return Err(ConfigError::InvalidReportConfidence {
                value: self.report_default_confidence,
            });
        }

        self.stream.validate()?;
        self.pagination.validate()?;

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_report_default_confidence() -> f64 {
    0.8
}

fn default_stream_keep_alive_seconds() -> u64 {
    15
}

fn default_page_limit() -> usize {
    50
}

fn default_max_page_limit() -> usize {
    500
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidNumber { key: String, value: String },
    #[error("log format must be 'json' or 'pretty', got '{value}'")]
    InvalidLogFormat { value: String },
    #[error("report default confidence must be between 0.0 and 1.0, got {value}")]
    InvalidReportConfidence { value: f64 },
    #[error("stream keep-alive must be between 1 and 300 seconds, got {value}")]
    InvalidKeepAlive { value: u64 },
    #[error("default page limit ({default}) must be at least 1 and not exceed max page limit ({max})")]
    InvalidPageLimits { default: usize, max: usize },
}

/// Loads configuration using layered `.env` files and `DUMPWATCH_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, validates and returns the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .map(|v| v.to_lowercase())
            .unwrap_or_else(default_log_format);

        let report_default_confidence = parse_number(
            &mut layered,
            "REPORT_DEFAULT_CONFIDENCE",
            default_report_default_confidence,
        )?;
        let keep_alive_seconds = parse_number(
            &mut layered,
            "STREAM_KEEP_ALIVE_SECONDS",
            default_stream_keep_alive_seconds,
        )?;
        let default_limit = parse_number(&mut layered, "DEFAULT_PAGE_LIMIT", default_page_limit)?;
        let max_limit = parse_number(&mut layered, "MAX_PAGE_LIMIT", default_max_page_limit)?;

        let cors_allowed_origins = layered
            .remove("CORS_ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            report_default_confidence,
            cors_allowed_origins,
            stream: StreamConfig { keep_alive_seconds },
            pagination: PaginationConfig {
                default_limit,
                max_limit,
            },
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{}PROFILE", ENV_PREFIX))
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a numeric setting; empty or absent falls back to the default, garbage is an error.
fn parse_number<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: fn() -> T,
) -> Result<T, ConfigError> {
    match layered.remove(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default()),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            key: format!("{}{}", ENV_PREFIX, key),
            value: raw,
        }),
    }
}
