//! Configuration loading and constants.
//!
//! `ServerConfig` is what a `HealthServer` is built from. `AppConfig` is the root
//! of the optional TOML file read by the binary; every section falls back to the
//! defaults defined here.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use http::StatusCode;

// =============================================================================
// Server Defaults
// =============================================================================

/// Default bind address (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listening port
pub const DEFAULT_PORT: u16 = 8000;

/// Default URL path answered by the health evaluator
pub const DEFAULT_PATH: &str = "/healthcheck";

// =============================================================================
// Fixed Responses
// =============================================================================

/// Body returned for any path other than the configured one
pub const NOT_FOUND_BODY: &str = "404 Not Found";

/// Body returned when the evaluator fails or panics
pub const INTERNAL_ERROR_BODY: &str = "500 Internal Server Error";

/// Health responses must never be cached by intermediaries
pub const CACHE_CONTROL_HEALTH: &str = "no-store";

// =============================================================================
// Binary Defaults
// =============================================================================

/// Default health status served by the binary
pub const DEFAULT_RESPONSE_STATUS: u16 = 200;

/// Default health body served by the binary
pub const DEFAULT_RESPONSE_BODY: &str = "OK";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "tiny_healthcheck=info,tiny_healthcheck::middleware=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Upper bound on how long a signal-triggered shutdown waits for in-flight requests
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Bind settings for a single health server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address: an IP literal or a hostname resolved at start
    pub host: String,
    /// `0` asks the OS for an ephemeral port
    pub port: u16,
    /// URL path answered by the evaluator.
    ///
    /// Trailing slashes are trimmed from this value as well as from request
    /// paths, so `/ready/` matches a request for `/ready` and `/` matches only
    /// the root.
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            path: path.into(),
        }
    }

    /// Configured path with trailing slashes trimmed, as used for matching.
    pub fn normalized_path(&self) -> &str {
        normalize_path(&self.path)
    }

    /// `host:port` string for logging and error messages
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Trim trailing `/` characters from a request or configured path.
pub fn normalize_path(path: &str) -> &str {
    path.trim_end_matches('/')
}

/// Fixed response served by the binary's static evaluator
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseConfig {
    #[serde(default = "ResponseConfig::default_status")]
    pub status: u16,
    #[serde(default = "ResponseConfig::default_body")]
    pub body: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: Self::default_status(),
            body: Self::default_body(),
        }
    }
}

impl ResponseConfig {
    fn default_status() -> u16 {
        DEFAULT_RESPONSE_STATUS
    }

    fn default_body() -> String {
        DEFAULT_RESPONSE_BODY.to_string()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "server.path must start with '/', got {:?}",
                self.server.path
            )));
        }

        if StatusCode::from_u16(self.response.status).is_err() {
            return Err(ConfigError::Validation(format!(
                "response.status {} is not a valid HTTP status code",
                self.response.status
            )));
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
