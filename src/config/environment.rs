//! Snapshot of the environment variables that drive authentication.
//!
//! Credential resolution is a pure function of an [`Environment`] snapshot and
//! the token cache file. Tool calls capture a fresh snapshot every time, so a
//! changed `META_ACCESS_TOKEN` is picked up by the embedding host's next call.

use std::fmt;

/// Static bearer token (static token mode).
pub const ENV_ACCESS_TOKEN: &str = "META_ACCESS_TOKEN";
/// OAuth app id.
pub const ENV_APP_ID: &str = "META_APP_ID";
/// OAuth app secret.
pub const ENV_APP_SECRET: &str = "META_APP_SECRET";
/// Graph API version override.
pub const ENV_GRAPH_API_VERSION: &str = "META_GRAPH_API_VERSION";
/// Comma-separated OAuth scopes requested at login.
pub const ENV_AUTH_SCOPE: &str = "META_AUTH_SCOPE";
/// Facebook Login for Business configuration id (replaces `scope`).
pub const ENV_LOGIN_CONFIG_ID: &str = "META_LOGIN_CONFIG_ID";

/// Graph API version used when nothing else is configured.
pub const DEFAULT_API_VERSION: &str = "v25.0";

/// The authentication-relevant environment at one point in time.
///
/// Empty or whitespace-only variables are treated as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// `META_ACCESS_TOKEN`.
    pub access_token: Option<String>,
    /// `META_APP_ID`.
    pub app_id: Option<String>,
    /// `META_APP_SECRET`.
    pub app_secret: Option<String>,
    /// `META_GRAPH_API_VERSION`.
    pub graph_api_version: Option<String>,
    /// `META_AUTH_SCOPE`.
    pub auth_scope: Option<String>,
    /// `META_LOGIN_CONFIG_ID`.
    pub login_config_id: Option<String>,
}

impl Environment {
    /// Reads the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            access_token: read_var(ENV_ACCESS_TOKEN),
            app_id: read_var(ENV_APP_ID),
            app_secret: read_var(ENV_APP_SECRET),
            graph_api_version: read_var(ENV_GRAPH_API_VERSION),
            auth_scope: read_var(ENV_AUTH_SCOPE),
            login_config_id: read_var(ENV_LOGIN_CONFIG_ID),
        }
    }

    /// Replaces the app id (from `--app-id`).
    #[must_use]
    pub fn with_app_id(mut self, app_id: Option<String>) -> Self {
        if let Some(id) = app_id.and_then(non_blank) {
            self.app_id = Some(id);
        }
        self
    }

    /// Resolves the Graph API version: environment, then config, then default.
    ///
    /// Values without the leading `v` are accepted; anything that does not
    /// look like `vNN.N` falls back to [`DEFAULT_API_VERSION`].
    #[must_use]
    pub fn api_version(&self, configured: Option<&str>) -> String {
        let raw = self.graph_api_version.as_deref().or(configured);
        normalize_api_version(raw)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secrets are reported by presence only.
        f.debug_struct("Environment")
            .field("access_token", &self.access_token.as_ref().map(|_| "<set>"))
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<set>"))
            .field("graph_api_version", &self.graph_api_version)
            .field("auth_scope", &self.auth_scope)
            .field("login_config_id", &self.login_config_id)
            .finish()
    }
}

fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalises an API version to `vNN.N`, falling back to the default.
#[must_use]
pub fn normalize_api_version(raw: Option<&str>) -> String {
    let Some(candidate) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_API_VERSION.to_string();
    };

    let candidate = if candidate.starts_with('v') {
        candidate.to_string()
    } else {
        format!("v{candidate}")
    };

    if is_valid_api_version(&candidate) {
        candidate
    } else {
        tracing::warn!(
            version = %candidate,
            fallback = DEFAULT_API_VERSION,
            "Ignoring malformed Graph API version"
        );
        DEFAULT_API_VERSION.to_string()
    }
}

/// Returns `true` for strings of the form `v<digits>.<digits>`.
#[must_use]
pub fn is_valid_api_version(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    let Some((major, minor)) = rest.split_once('.') else {
        return false;
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    all_digits(major) && all_digits(minor)
}
