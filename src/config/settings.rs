//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Every section is optional; a missing file yields [`Config::default`].

use std::path::PathBuf;

use serde::Deserialize;

use crate::config::environment::is_valid_api_version;
use crate::error::ConfigError;

/// Upper bound on automatic retries for idempotent requests.
const MAX_RETRIES_LIMIT: u32 = 5;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Graph API settings.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Credential and login settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref version) = self.graph.api_version {
            if !is_valid_api_version(version) {
                return Err(ConfigError::ValidationError {
                    message: format!(
                        "Invalid Graph API version '{version}'. Expected a value like 'v25.0'"
                    ),
                });
            }
        }

        for (name, url) in [
            ("graph.base_url", &self.graph.base_url),
            ("graph.dialog_base_url", &self.graph.dialog_base_url),
        ] {
            if url::Url::parse(url).is_err() {
                return Err(ConfigError::ValidationError {
                    message: format!("{name} is not a valid URL: '{url}'"),
                });
            }
        }

        if self.graph.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "graph.request_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.graph.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "graph.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                    self.graph.max_retries
                ),
            });
        }

        if self.auth.login_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "auth.login_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.auth.callback_port_attempts == 0 {
            return Err(ConfigError::ValidationError {
                message: "auth.callback_port_attempts must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Graph API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// API version segment, e.g. "v25.0". `META_GRAPH_API_VERSION` takes precedence.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Base URL of the Graph API host.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the OAuth dialog host.
    #[serde(default = "default_dialog_base_url")]
    pub dialog_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries for idempotent requests after transport or 5xx failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff between retries in milliseconds (doubles each attempt).
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            api_version: None,
            base_url: default_base_url(),
            dialog_base_url: default_dialog_base_url(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_dialog_base_url() -> String {
    "https://www.facebook.com".to_string()
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_retry_backoff() -> u64 {
    250
}

/// Credential and login configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Overrides the platform-specific token cache location.
    #[serde(default)]
    pub token_cache_path: Option<PathBuf>,

    /// First port tried for the OAuth callback listener.
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    /// Number of consecutive ports tried before giving up.
    #[serde(default = "default_callback_port_attempts")]
    pub callback_port_attempts: u16,

    /// How long the login flow waits for the browser callback, in seconds.
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,

    /// OAuth scopes requested at login. `META_AUTH_SCOPE` takes precedence.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_cache_path: None,
            callback_port: default_callback_port(),
            callback_port_attempts: default_callback_port_attempts(),
            login_timeout_secs: default_login_timeout(),
            scopes: None,
        }
    }
}

const fn default_callback_port() -> u16 {
    8080
}

const fn default_callback_port_attempts() -> u16 {
    10
}

const fn default_login_timeout() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
