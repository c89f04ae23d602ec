//! Interactive OAuth login (`--login`).
//!
//! ```text
//! idle ─▶ awaiting_app_credentials ─▶ listening_for_callback ─▶ exchanging_code
//!                                                                     │
//!                                          done ◀─ caching_token ◀────┘
//! ```
//!
//! The flow is a one-shot entry point, separate from the tool-serving loop.
//! Every failure is terminal for the login attempt only.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::auth::callback::{CallbackListener, CallbackParams};
use crate::auth::credential::TokenCacheRecord;
use crate::auth::store::CredentialStore;
use crate::config::{Config, Environment};
use crate::error::AuthError;
use crate::graph::sanitize::{sanitize, sanitize_str};

/// Scopes requested when neither `META_AUTH_SCOPE` nor the config sets any.
pub const DEFAULT_SCOPES: &[&str] = &[
    "business_management",
    "public_profile",
    "pages_show_list",
    "pages_read_engagement",
];

/// States of the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// Not started.
    Idle,
    /// Checking `META_APP_ID` / `META_APP_SECRET`.
    AwaitingAppCredentials,
    /// Browser opened; waiting for the redirect.
    ListeningForCallback,
    /// Trading the authorization code for a token.
    ExchangingCode,
    /// Writing the token cache.
    CachingToken,
    /// Token cached.
    Done,
}

/// Opens the authorization URL for the user.
pub trait BrowserLauncher {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if no browser could be launched.
    fn open(&self, url: &Url) -> std::io::Result<()>;
}

/// Launches the system default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        webbrowser::open(url.as_str())
    }
}

/// Login parameters derived from config and environment.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    /// Graph API version segment.
    pub api_version: String,
    /// OAuth dialog host.
    pub dialog_base_url: String,
    /// Graph API host (token endpoint).
    pub graph_base_url: String,
    /// First callback port tried.
    pub callback_port: u16,
    /// Number of callback ports tried.
    pub callback_port_attempts: u16,
    /// Bounded wait for the callback.
    pub callback_timeout: Duration,
    /// Timeout for each token endpoint request.
    pub request_timeout: Duration,
    /// Requested scopes (ignored when `config_id` is set).
    pub scopes: Vec<String>,
    /// Facebook Login for Business configuration id.
    pub config_id: Option<String>,
}

impl LoginSettings {
    /// Builds settings; environment values take precedence over the config file.
    #[must_use]
    pub fn from_config(config: &Config, env: &Environment) -> Self {
        let scopes = env
            .auth_scope
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|s| !s.is_empty())
            .or_else(|| config.auth.scopes.clone())
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect());

        Self {
            api_version: env.api_version(config.graph.api_version.as_deref()),
            dialog_base_url: config.graph.dialog_base_url.clone(),
            graph_base_url: config.graph.base_url.clone(),
            callback_port: config.auth.callback_port,
            callback_port_attempts: config.auth.callback_port_attempts,
            callback_timeout: Duration::from_secs(config.auth.login_timeout_secs),
            request_timeout: Duration::from_secs(config.graph.request_timeout_secs),
            scopes,
            config_id: env.login_config_id.clone(),
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth/access_token",
            self.graph_base_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Builds the provider authorization URL.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CallbackUnavailable`] if the dialog base URL is invalid.
    pub fn authorization_url(
        &self,
        app_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Url, AuthError> {
        let base = format!(
            "{}/{}/dialog/oauth",
            self.dialog_base_url.trim_end_matches('/'),
            self.api_version
        );
        let mut params = vec![
            ("client_id", app_id.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("response_type", "code".to_string()),
            ("state", state.to_string()),
        ];
        match self.config_id {
            Some(ref config_id) => params.push(("config_id", config_id.clone())),
            None => params.push(("scope", self.scopes.join(","))),
        }
        Url::parse_with_params(&base, &params).map_err(|e| AuthError::CallbackUnavailable {
            message: format!("invalid OAuth dialog URL '{base}': {e}"),
        })
    }
}

/// Token endpoint payload.
#[derive(Debug, Clone)]
struct IssuedToken {
    access_token: String,
    expires_in: Option<u64>,
    raw: Value,
}

/// Drives one interactive login to completion.
pub struct LoginFlow<B: BrowserLauncher> {
    settings: LoginSettings,
    store: CredentialStore,
    browser: B,
    http: reqwest::Client,
    state: LoginState,
}

impl<B: BrowserLauncher> LoginFlow<B> {
    /// Creates an idle login flow.
    #[must_use]
    pub fn new(settings: LoginSettings, store: CredentialStore, browser: B) -> Self {
        Self {
            settings,
            store,
            browser,
            http: reqwest::Client::new(),
            state: LoginState::Idle,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LoginState {
        self.state
    }

    fn transition(&mut self, next: LoginState) {
        tracing::debug!(from = ?self.state, to = ?next, "Login state transition");
        self.state = next;
    }

    /// Runs the flow and returns the cached record.
    ///
    /// # Errors
    ///
    /// Returns the login-specific [`AuthError`] that terminated the attempt.
    pub async fn run(&mut self, env: &Environment) -> Result<TokenCacheRecord, AuthError> {
        self.transition(LoginState::AwaitingAppCredentials);
        let (app_id, app_secret) = match (env.app_id.as_deref(), env.app_secret.as_deref()) {
            (Some(id), Some(secret)) => (id.to_string(), secret.to_string()),
            (id, secret) => {
                let missing: Vec<&str> = [
                    id.is_none().then_some("META_APP_ID"),
                    secret.is_none().then_some("META_APP_SECRET"),
                ]
                .into_iter()
                .flatten()
                .collect();
                return Err(AuthError::MissingAppCredentials {
                    missing: missing.join(", "),
                });
            }
        };

        let listener = CallbackListener::bind(
            self.settings.callback_port,
            self.settings.callback_port_attempts,
        )
        .await?;
        let redirect_uri = listener.redirect_uri();
        let expected_state = uuid::Uuid::new_v4().simple().to_string();
        let auth_url = self
            .settings
            .authorization_url(&app_id, &redirect_uri, &expected_state)?;

        self.transition(LoginState::ListeningForCallback);
        eprintln!("Opening browser for Meta login: {auth_url}");
        if let Err(e) = self.browser.open(&auth_url) {
            tracing::warn!(error = %e, "Failed to open browser");
            eprintln!("Could not open a browser. Visit the URL above manually.");
        }

        let params = listener
            .wait(self.settings.callback_timeout, &expected_state)
            .await?;
        let code = validate_callback(&params, &expected_state)?;

        self.transition(LoginState::ExchangingCode);
        let short_lived = self
            .exchange_code(&app_id, &app_secret, &redirect_uri, &code)
            .await?;

        let (issued, long_lived) = match self.exchange_long_lived(&app_id, &app_secret, &short_lived).await {
            Some(long) => (long, true),
            None => (short_lived, false),
        };

        self.transition(LoginState::CachingToken);
        let mut record = TokenCacheRecord::new(issued.access_token, app_id, sanitize(issued.raw));
        record.expires_in = issued.expires_in;
        record.long_lived = long_lived;
        if self.settings.config_id.is_none() {
            record.scopes.clone_from(&self.settings.scopes);
        }
        self.store.persist(&record)?;

        self.transition(LoginState::Done);
        tracing::info!(
            long_lived,
            expires_in = ?record.expires_in,
            "Login complete"
        );
        Ok(record)
    }

    async fn exchange_code(
        &self,
        app_id: &str,
        app_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<IssuedToken, AuthError> {
        let query = [
            ("client_id", app_id),
            ("redirect_uri", redirect_uri),
            ("client_secret", app_secret),
            ("code", code),
        ];
        self.token_request(&query).await
    }

    /// Upgrades a short-lived token. Failure is logged, not fatal.
    async fn exchange_long_lived(
        &self,
        app_id: &str,
        app_secret: &str,
        short_lived: &IssuedToken,
    ) -> Option<IssuedToken> {
        let query = [
            ("grant_type", "fb_exchange_token"),
            ("client_id", app_id),
            ("client_secret", app_secret),
            ("fb_exchange_token", short_lived.access_token.as_str()),
        ];
        match self.token_request(&query).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "Long-lived token exchange failed; caching short-lived token");
                None
            }
        }
    }

    async fn token_request(&self, query: &[(&str, &str)]) -> Result<IssuedToken, AuthError> {
        let response = self
            .http
            .get(self.settings.token_endpoint())
            .query(query)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(|e| AuthError::CodeExchangeFailed {
                status: 0,
                body: sanitize_str(&e.without_url().to_string()),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(AuthError::CodeExchangeFailed {
                status: status.as_u16(),
                body: sanitize_str(&body),
            });
        }

        let raw: Value = serde_json::from_str(&body).map_err(|_| AuthError::CodeExchangeFailed {
            status: status.as_u16(),
            body: "token endpoint returned a non-JSON body".to_string(),
        })?;

        let access_token = raw
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::CodeExchangeFailed {
                status: status.as_u16(),
                body: "token endpoint response carried no access_token".to_string(),
            })?
            .to_string();

        Ok(IssuedToken {
            access_token,
            expires_in: raw.get("expires_in").and_then(parse_expires_in),
            raw,
        })
    }
}

/// Checks the redirect against the generated state and extracts the code.
///
/// The state is compared first, so a forged callback never reaches the
/// token endpoint regardless of its other parameters.
fn validate_callback(params: &CallbackParams, expected_state: &str) -> Result<String, AuthError> {
    if params.state.as_deref() != Some(expected_state) {
        tracing::warn!("OAuth callback state mismatch; aborting login");
        return Err(AuthError::OAuthStateMismatch);
    }

    if let Some(ref error) = params.error {
        return Err(AuthError::AuthorizationDenied {
            reason: params
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone()),
        });
    }

    params
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::AuthorizationDenied {
            reason: "callback carried no authorization code".to_string(),
        })
}

/// Meta reports `expires_in` as a number or numeric string; 0 means unknown.
fn parse_expires_in(value: &Value) -> Option<u64> {
    let secs = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (secs > 0).then_some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> LoginSettings {
        LoginSettings::from_config(&Config::default(), &Environment::default())
    }

    #[test]
    fn authorization_url_carries_state_and_scope() {
        let url = settings()
            .authorization_url("1234", "http://localhost:8080/callback", "abc123")
            .unwrap();
        assert_eq!(url.path(), "/v25.0/dialog/oauth");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "1234");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["state"], "abc123");
        assert!(pairs["scope"].contains("business_management"));
        assert!(!pairs.contains_key("config_id"));
    }

    #[test]
    fn config_id_replaces_scope() {
        let env = Environment {
            login_config_id: Some("987".into()),
            ..Environment::default()
        };
        let url = LoginSettings::from_config(&Config::default(), &env)
            .authorization_url("1234", "http://localhost:8080/callback", "s")
            .unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["config_id"], "987");
        assert!(!pairs.contains_key("scope"));
    }

    #[test]
    fn env_scope_overrides_default() {
        let env = Environment {
            auth_scope: Some("ads_read, ads_management ,".into()),
            ..Environment::default()
        };
        let settings = LoginSettings::from_config(&Config::default(), &env);
        assert_eq!(settings.scopes, vec!["ads_read", "ads_management"]);
    }

    #[test]
    fn state_mismatch_is_rejected_before_error_or_code() {
        let params = CallbackParams {
            code: Some("code".into()),
            state: Some("forged".into()),
            ..CallbackParams::default()
        };
        assert!(matches!(
            validate_callback(&params, "expected"),
            Err(AuthError::OAuthStateMismatch)
        ));

        let missing_state = CallbackParams {
            code: Some("code".into()),
            ..CallbackParams::default()
        };
        assert!(matches!(
            validate_callback(&missing_state, "expected"),
            Err(AuthError::OAuthStateMismatch)
        ));
    }

    #[test]
    fn provider_error_is_denial() {
        let params = CallbackParams {
            state: Some("expected".into()),
            error: Some("access_denied".into()),
            error_description: Some("Permissions error".into()),
            ..CallbackParams::default()
        };
        let err = validate_callback(&params, "expected").unwrap_err();
        assert_eq!(err.kind(), "AuthorizationDenied");
        assert!(err.to_string().contains("Permissions error"));
    }

    #[test]
    fn matching_state_yields_code() {
        let params = CallbackParams {
            code: Some("the-code".into()),
            state: Some("expected".into()),
            ..CallbackParams::default()
        };
        assert_eq!(validate_callback(&params, "expected").unwrap(), "the-code");
    }

    #[test]
    fn expires_in_parsing() {
        assert_eq!(parse_expires_in(&json!(3600)), Some(3600));
        assert_eq!(parse_expires_in(&json!("5184000")), Some(5_184_000));
        assert_eq!(parse_expires_in(&json!(0)), None);
        assert_eq!(parse_expires_in(&json!(null)), None);
    }
}
