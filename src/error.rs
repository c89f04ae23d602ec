//! Error types for meta-ads-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! Provider messages are carried verbatim for diagnosis, but every error
//! surfaced to an MCP client passes through the response sanitiser first.
//!
//! Every tool-facing error exposes a stable [`kind`](ToolError::kind) tag and
//! an optional human-readable remediation hint.

use std::fmt;
use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

use crate::auth::CredentialSource;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while resolving credentials or running the login flow.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No credential could be resolved from the environment or the cache.
    #[error("authentication required: {reason}")]
    AuthenticationRequired {
        /// Why resolution failed.
        reason: String,
    },

    /// `META_APP_ID` and/or `META_APP_SECRET` are not set.
    #[error("missing app credentials: {missing} not set")]
    MissingAppCredentials {
        /// Which variables are missing.
        missing: String,
    },

    /// The callback's `state` did not match the one generated for this login.
    #[error("OAuth state mismatch: callback did not originate from this login attempt")]
    OAuthStateMismatch,

    /// The token endpoint rejected the authorization code.
    #[error("authorization code exchange failed (HTTP {status}): {body}")]
    CodeExchangeFailed {
        /// HTTP status returned by the token endpoint (0 if no response).
        status: u16,
        /// Provider response body.
        body: String,
    },

    /// No callback arrived before the deadline.
    #[error("login timed out after {seconds}s waiting for the browser callback")]
    LoginTimedOut {
        /// Configured wait in seconds.
        seconds: u64,
    },

    /// The provider redirected back with an error, or without a code.
    #[error("authorization denied: {reason}")]
    AuthorizationDenied {
        /// Provider-supplied reason.
        reason: String,
    },

    /// The local callback listener could not be started.
    #[error("OAuth callback listener unavailable: {message}")]
    CallbackUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The token cache file could not be written.
    #[error("failed to write token cache: {path}")]
    CachePersist {
        /// Cache file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    /// Returns the stable kind tag for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired { .. } => "AuthenticationRequired",
            Self::MissingAppCredentials { .. } => "MissingAppCredentials",
            Self::OAuthStateMismatch => "OAuthStateMismatch",
            Self::CodeExchangeFailed { .. } => "CodeExchangeFailed",
            Self::LoginTimedOut { .. } => "LoginTimedOut",
            Self::AuthorizationDenied { .. } => "AuthorizationDenied",
            Self::CallbackUnavailable { .. } => "CallbackUnavailable",
            Self::CachePersist { .. } => "CachePersistFailed",
        }
    }

    /// Returns a remediation hint for the user.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        let hint = match self {
            Self::AuthenticationRequired { .. } => {
                "Set META_ACCESS_TOKEN, or set META_APP_ID and META_APP_SECRET and run \
                 `meta-ads-mcp --login`."
            }
            Self::MissingAppCredentials { .. } => {
                "Set META_APP_ID and META_APP_SECRET (or pass --app-id) before running --login."
            }
            Self::OAuthStateMismatch => {
                "Run `meta-ads-mcp --login` again and complete it in the browser tab it opens."
            }
            Self::CodeExchangeFailed { .. } => {
                "Check that META_APP_SECRET belongs to META_APP_ID and that the redirect URI \
                 is registered in the Meta app settings."
            }
            Self::LoginTimedOut { .. } => {
                "Run `meta-ads-mcp --login` again and finish the browser step before the deadline."
            }
            Self::AuthorizationDenied { .. } => {
                "Approve the requested permissions in the Meta dialog, then run --login again."
            }
            Self::CallbackUnavailable { .. } => {
                "Free a port in the callback range or set auth.callback_port in the config file."
            }
            Self::CachePersist { .. } => "Check permissions on the token cache directory.",
        };
        Some(hint.to_string())
    }
}

/// Error details reported by the Graph API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status, if the error came from an HTTP response.
    pub status: Option<u16>,
    /// Graph API error code (`error.code`).
    pub code: Option<i64>,
    /// Graph API error subcode (`error.error_subcode`).
    pub subcode: Option<i64>,
    /// Provider message, verbatim.
    pub message: String,
    /// Graph API trace id, useful when contacting Meta support.
    pub fbtrace_id: Option<String>,
}

impl ProviderError {
    /// Creates an error that originates locally rather than from the provider.
    #[must_use]
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Returns these details as a JSON object, omitting absent fields.
    #[must_use]
    pub fn details(&self) -> Value {
        let mut details = serde_json::Map::new();
        if let Some(status) = self.status {
            details.insert("http_status".into(), json!(status));
        }
        if let Some(code) = self.code {
            details.insert("code".into(), json!(code));
        }
        if let Some(subcode) = self.subcode {
            details.insert("error_subcode".into(), json!(subcode));
        }
        if let Some(ref trace) = self.fbtrace_id {
            details.insert("fbtrace_id".into(), json!(trace));
        }
        Value::Object(details)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors raised by the request pipeline.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The provider rejected the credential.
    #[error("invalid or expired access token: {error}")]
    InvalidOrExpiredToken {
        /// Where the rejected credential came from.
        credential_source: CredentialSource,
        /// Provider details.
        error: ProviderError,
    },

    /// The credential is valid but lacks the required scope or account access.
    #[error("insufficient permission: {error}")]
    InsufficientPermission {
        /// Provider details.
        error: ProviderError,
    },

    /// The provider is throttling this app, user, or ad account.
    #[error("rate limited: {error}")]
    RateLimited {
        /// Provider details.
        error: ProviderError,
    },

    /// Malformed parameters or a provider-side validation failure.
    #[error("invalid request: {error}")]
    InvalidRequest {
        /// Provider (or local validation) details.
        error: ProviderError,
    },

    /// DNS, connect, or timeout failure.
    #[error("transport error: {message}")]
    TransportError {
        /// Description of the failure.
        message: String,
    },

    /// The provider returned a 5xx response.
    #[error("Meta API unavailable: {error}")]
    UpstreamUnavailable {
        /// Provider details.
        error: ProviderError,
    },
}

impl ApiError {
    /// Creates a locally raised invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            error: ProviderError::local(message),
        }
    }

    /// Returns `true` if the pipeline may retry this error for idempotent tools.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError { .. } | Self::UpstreamUnavailable { .. }
        )
    }

    /// Returns the stable kind tag for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidOrExpiredToken { .. } => "InvalidOrExpiredToken",
            Self::InsufficientPermission { .. } => "InsufficientPermission",
            Self::RateLimited { .. } => "RateLimited",
            Self::InvalidRequest { .. } => "InvalidRequest",
            Self::TransportError { .. } => "TransportError",
            Self::UpstreamUnavailable { .. } => "UpstreamUnavailable",
        }
    }

    /// Returns a remediation hint for the user.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        let hint = match self {
            Self::InvalidOrExpiredToken {
                credential_source: CredentialSource::EnvToken,
                ..
            } => "Generate a new access token and update META_ACCESS_TOKEN.",
            Self::InvalidOrExpiredToken {
                credential_source: CredentialSource::OAuthCache,
                ..
            } => "Run `meta-ads-mcp --login` to obtain a new access token.",
            Self::InsufficientPermission { .. } => {
                "Grant the token the ads_read/ads_management permissions and access to the ad \
                 account in Meta Business Settings."
            }
            Self::RateLimited { .. } => {
                "Wait before retrying; Meta is throttling this app or ad account."
            }
            Self::InvalidRequest { .. } => "Fix the tool parameters described in the message.",
            Self::TransportError { .. } => {
                "Check network connectivity to graph.facebook.com and retry."
            }
            Self::UpstreamUnavailable { .. } => {
                "Meta's API is temporarily unavailable; retry later."
            }
        };
        Some(hint.to_string())
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::InvalidOrExpiredToken { error, .. }
            | Self::InsufficientPermission { error }
            | Self::RateLimited { error }
            | Self::InvalidRequest { error }
            | Self::UpstreamUnavailable { error } => {
                let details = error.details();
                details
                    .as_object()
                    .is_some_and(|d| !d.is_empty())
                    .then_some(details)
            }
            Self::TransportError { .. } => None,
        }
    }
}

/// Any error a tool invocation can surface to the MCP client.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Credential resolution failed before any network call.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request pipeline failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ToolError {
    /// Returns the stable kind tag for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.kind(),
            Self::Api(e) => e.kind(),
        }
    }

    /// Returns a remediation hint for the user.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::Auth(e) => e.remediation(),
            Self::Api(e) => e.remediation(),
        }
    }

    /// Builds the structured error envelope returned to MCP clients.
    ///
    /// The envelope is not sanitised here; callers pass it through
    /// [`sanitize`](crate::graph::sanitize::sanitize) before it leaves the process.
    #[must_use]
    pub fn envelope(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(remediation) = self.remediation() {
            error["remediation"] = json!(remediation);
        }
        if let Self::Api(api) = self {
            if let Some(details) = api.details() {
                error["details"] = details;
            }
        }
        json!({
            "status": "error",
            "error": error,
        })
    }
}
