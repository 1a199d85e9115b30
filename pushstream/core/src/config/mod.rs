//! TOML Configuration File Support
//!
//! This module provides centralized configuration loading for pushstream,
//! supporting a TOML configuration file at `~/.config/pushstream/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. Programmatic overrides ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [gateway]
//! endpoint = "https://abc123.execute-api.us-east-1.amazonaws.com/prod"
//! auth_token = "secret"
//! request_timeout_ms = 10000
//!
//! [stream]
//! heartbeat_interval_ms = 10000
//!
//! [registry]
//! connection_ttl_secs = 3600
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Setting |
//! |---|---|
//! | `PUSHSTREAM_GATEWAY_ENDPOINT` | `gateway.endpoint` |
//! | `PUSHSTREAM_GATEWAY_TOKEN` | `gateway.auth_token` |
//! | `PUSHSTREAM_GATEWAY_TIMEOUT_MS` | `gateway.request_timeout_ms` |
//! | `PUSHSTREAM_HEARTBEAT_INTERVAL_MS` | `stream.heartbeat_interval_ms` |
//! | `PUSHSTREAM_CONNECTION_TTL_SECS` | `registry.connection_ttl_secs` |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::DEFAULT_CONNECTION_TTL;
use crate::streaming::{StreamManagerConfig, DEFAULT_HEARTBEAT_INTERVAL};
use crate::transport::GatewayConfig;

pub const ENV_GATEWAY_ENDPOINT: &str = "PUSHSTREAM_GATEWAY_ENDPOINT";
pub const ENV_GATEWAY_TOKEN: &str = "PUSHSTREAM_GATEWAY_TOKEN";
pub const ENV_GATEWAY_TIMEOUT_MS: &str = "PUSHSTREAM_GATEWAY_TIMEOUT_MS";
pub const ENV_HEARTBEAT_INTERVAL_MS: &str = "PUSHSTREAM_HEARTBEAT_INTERVAL_MS";
pub const ENV_CONNECTION_TTL_SECS: &str = "PUSHSTREAM_CONNECTION_TTL_SECS";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from a programmatic override
    Override,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Gateway section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayToml {
    /// Connection-management endpoint
    pub endpoint: Option<String>,

    /// Bearer token sent with every push
    pub auth_token: Option<String>,

    /// Per-request timeout in milliseconds
    pub request_timeout_ms: Option<u64>,
}

/// Stream section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: Option<u64>,
}

/// Registry section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryToml {
    /// Lifetime of a connection entry in seconds
    pub connection_ttl_secs: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushstreamToml {
    pub gateway: GatewayToml,
    pub stream: StreamToml,
    pub registry: RegistryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for pushstream
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct PushstreamConfig {
    /// Gateway transport settings
    pub gateway: GatewayConfig,

    /// Cadence of IN_PROGRESS envelopes
    pub heartbeat_interval: Duration,

    /// Lifetime of connection registry entries
    pub connection_ttl: Duration,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for PushstreamConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connection_ttl: DEFAULT_CONNECTION_TTL,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PushstreamConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Stream manager settings derived from this configuration
    #[must_use]
    pub fn stream_config(&self) -> StreamManagerConfig {
        StreamManagerConfig {
            heartbeat_interval: self.heartbeat_interval,
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for a zero interval or timeout,
    /// or an endpoint that is not an http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "heartbeat interval must be greater than zero".into(),
            ));
        }
        if self.gateway.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "gateway request timeout must be greater than zero".into(),
            ));
        }
        if let Some(endpoint) = &self.gateway.endpoint {
            let url = reqwest::Url::parse(endpoint).map_err(|e| {
                ConfigError::ValidationError(format!("invalid gateway endpoint {endpoint:?}: {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::ValidationError(format!(
                    "gateway endpoint must use http or https, got {:?}",
                    url.scheme()
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/pushstream/config.toml` or
/// `~/.config/pushstream/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pushstream").join("config.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resulting values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<PushstreamConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Arguments
///
/// * `path` - Optional path to the configuration file. If `None`, only defaults
///   and environment variables are used.
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// the resulting values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PushstreamConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

fn load_config_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<PushstreamConfig, ConfigError> {
    let mut config = PushstreamConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PushstreamToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PushstreamConfig, toml: &PushstreamToml) {
    if toml.gateway.endpoint.is_some() {
        config.gateway.endpoint = toml.gateway.endpoint.clone();
    }
    if toml.gateway.auth_token.is_some() {
        config.gateway.auth_token = toml.gateway.auth_token.clone();
    }
    if let Some(timeout) = toml.gateway.request_timeout_ms {
        config.gateway.request_timeout = Duration::from_millis(timeout);
    }
    if let Some(interval) = toml.stream.heartbeat_interval_ms {
        config.heartbeat_interval = Duration::from_millis(interval);
    }
    if let Some(ttl) = toml.registry.connection_ttl_secs {
        config.connection_ttl = Duration::from_secs(ttl);
    }
}

/// Apply environment variable overrides to the config
///
/// Unparseable numeric values are ignored with a warning.
fn apply_env_config(config: &mut PushstreamConfig, env: impl Fn(&str) -> Option<String>) {
    let parse_u64 = |key: &str| -> Option<u64> {
        let raw = env(key)?;
        match raw.parse::<u64>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring non-numeric environment value");
                None
            }
        }
    };

    if let Some(endpoint) = env(ENV_GATEWAY_ENDPOINT) {
        config.gateway.endpoint = Some(endpoint);
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env(ENV_GATEWAY_TOKEN) {
        config.gateway.auth_token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_u64(ENV_GATEWAY_TIMEOUT_MS) {
        config.gateway.request_timeout = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = parse_u64(ENV_HEARTBEAT_INTERVAL_MS) {
        config.heartbeat_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = parse_u64(ENV_CONNECTION_TTL_SECS) {
        config.connection_ttl = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// Override Support
// =============================================================================

/// Builder for applying programmatic overrides to configuration
///
/// Use this after [`load_config`], e.g. for values taken from a command line
/// or a test harness.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Gateway endpoint override
    pub gateway_endpoint: Option<String>,

    /// Gateway token override
    pub gateway_auth_token: Option<String>,

    /// Heartbeat interval override
    pub heartbeat_interval: Option<Duration>,

    /// Connection TTL override
    pub connection_ttl: Option<Duration>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_gateway_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.gateway_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_gateway_auth_token(mut self, token: impl Into<String>) -> Self {
        self.gateway_auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_connection_ttl(mut self, ttl: Duration) -> Self {
        self.connection_ttl = Some(ttl);
        self
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the result is invalid.
    pub fn apply(&self, config: &mut PushstreamConfig) -> Result<(), ConfigError> {
        if self.gateway_endpoint.is_some()
            || self.gateway_auth_token.is_some()
            || self.heartbeat_interval.is_some()
            || self.connection_ttl.is_some()
        {
            config.source = ConfigSource::Override;
        }

        if let Some(ref endpoint) = self.gateway_endpoint {
            config.gateway.endpoint = Some(endpoint.clone());
        }
        if let Some(ref token) = self.gateway_auth_token {
            config.gateway.auth_token = Some(token.clone());
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        if let Some(ttl) = self.connection_ttl {
            config.connection_ttl = ttl;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
