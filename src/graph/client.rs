//! HTTPS client for the Graph API.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{Credential, CredentialSource};
use crate::config::{Config, Environment};
use crate::error::{ApiError, ProviderError};
use crate::graph::request::{build_request, Endpoint, HttpMethod, PreparedRequest, ToolRequest};
use crate::graph::response::ApiResponse;
use crate::graph::retry::{with_retry, RetryPolicy};
use crate::graph::sanitize::sanitize_str;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Meta's throttling headers; their values are JSON usage percentages.
const USAGE_HEADERS: &[&str] = &["x-app-usage", "x-business-use-case-usage", "x-ad-account-usage"];

/// Graph API codes meaning the token is invalid, expired, or revoked.
const TOKEN_ERROR_CODES: &[i64] = &[102, 190];

/// Graph API throttling codes.
const RATE_LIMIT_CODES: &[i64] = &[4, 17, 32, 613];

/// Graph API client settings.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Scheme and host, e.g. `https://graph.facebook.com`.
    pub base_url: String,
    /// Version segment, e.g. `v25.0`.
    pub api_version: String,
    /// Per-attempt timeout.
    pub request_timeout: Duration,
    /// Retry policy for idempotent requests.
    pub retry: RetryPolicy,
}

impl GraphSettings {
    /// Builds settings; `META_GRAPH_API_VERSION` overrides the config file.
    #[must_use]
    pub fn from_config(config: &Config, env: &Environment) -> Self {
        Self {
            base_url: config.graph.base_url.clone(),
            api_version: env.api_version(config.graph.api_version.as_deref()),
            request_timeout: Duration::from_secs(config.graph.request_timeout_secs),
            retry: RetryPolicy::from_config(&config.graph),
        }
    }
}

/// Executes tool requests against the Graph API.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    settings: GraphSettings,
}

impl GraphClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::TransportError`] if the HTTP client cannot be initialised.
    pub fn new(settings: GraphSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ApiError::TransportError {
                message: format!("failed to initialise HTTP client: {e}"),
            })?;
        Ok(Self { http, settings })
    }

    /// Creates a client against a different host (used with mock servers).
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::TransportError`] if the HTTP client cannot be initialised.
    pub fn with_base_url(settings: GraphSettings, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::new(GraphSettings {
            base_url: base_url.into(),
            ..settings
        })
    }

    /// Client settings.
    #[must_use]
    pub const fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Builds the outbound request without sending it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the arguments do not fit the endpoint.
    pub fn prepare(&self, endpoint: &Endpoint, request: &ToolRequest) -> Result<PreparedRequest, ApiError> {
        build_request(
            &self.settings.base_url,
            &self.settings.api_version,
            endpoint,
            request,
        )
    }

    /// Builds and sends a tool request.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] on failure.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        request: &ToolRequest,
        credential: &Credential,
    ) -> Result<ApiResponse, ApiError> {
        let prepared = self.prepare(endpoint, request)?;
        self.send(&prepared, endpoint.paginated, credential).await
    }

    /// Sends a prepared request, retrying transient failures when it is idempotent.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] on failure.
    pub async fn send(
        &self,
        prepared: &PreparedRequest,
        paginated: bool,
        credential: &Credential,
    ) -> Result<ApiResponse, ApiError> {
        tracing::debug!(
            method = %prepared.method,
            path = prepared.url.path(),
            source = credential.source().log_label(),
            "Graph API request"
        );

        let body = if prepared.idempotent {
            with_retry(&self.settings.retry, || self.send_once(prepared, credential)).await?
        } else {
            self.send_once(prepared, credential).await?
        };

        Ok(ApiResponse::from_body(body, paginated))
    }

    async fn send_once(
        &self,
        prepared: &PreparedRequest,
        credential: &Credential,
    ) -> Result<Value, ApiError> {
        let url = prepared.url.clone();
        let builder = match prepared.method {
            HttpMethod::Get => self.http.get(url).query(&prepared.query),
            HttpMethod::Delete => self.http.delete(url).query(&prepared.query),
            HttpMethod::Post => self.http.post(url).form(&prepared.query),
        };

        let response = builder
            .bearer_auth(credential.access_token())
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        log_usage_headers(response.headers(), prepared.url.path());

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text).unwrap_or_else(|_| {
                json!({
                    "text_response": text,
                    "status_code": status.as_u16(),
                })
            }));
        }

        let error = classify(status.as_u16(), &text, credential.source());
        tracing::info!(
            status = status.as_u16(),
            kind = error.kind(),
            "Graph API request failed"
        );
        Err(error)
    }

    fn transport_error(&self, e: &reqwest::Error) -> ApiError {
        let message = if e.is_timeout() {
            format!(
                "request timed out after {}s",
                self.settings.request_timeout.as_secs()
            )
        } else {
            sanitize_str(&e.to_string())
        };
        ApiError::TransportError { message }
    }
}

fn log_usage_headers(headers: &HeaderMap, path: &str) {
    for name in USAGE_HEADERS {
        if let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) {
            tracing::debug!(header = *name, usage = value, path, "Meta rate usage");
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: GraphErrorObject,
}

#[derive(Debug, Deserialize)]
struct GraphErrorObject {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_user_msg: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

/// Maps a non-2xx Graph API response to an [`ApiError`].
#[must_use]
pub fn classify(status: u16, body: &str, source: CredentialSource) -> ApiError {
    let error = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => ProviderError {
            status: Some(status),
            code: error.code,
            subcode: error.error_subcode,
            message: sanitize_str(
                error
                    .message
                    .or(error.error_user_msg)
                    .as_deref()
                    .unwrap_or("Graph API error"),
            ),
            fbtrace_id: error.fbtrace_id,
        },
        Err(_) => ProviderError {
            status: Some(status),
            message: if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                sanitize_str(body.trim())
            },
            ..ProviderError::default()
        },
    };

    let code = error.code.unwrap_or_default();
    if TOKEN_ERROR_CODES.contains(&code) || status == 401 {
        ApiError::InvalidOrExpiredToken {
            credential_source: source,
            error,
        }
    } else if RATE_LIMIT_CODES.contains(&code) || (80_000..=80_014).contains(&code) || status == 429 {
        ApiError::RateLimited { error }
    } else if code == 10 || (200..=299).contains(&code) || status == 403 {
        ApiError::InsufficientPermission { error }
    } else if status >= 500 {
        ApiError::UpstreamUnavailable { error }
    } else {
        ApiError::InvalidRequest { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_error(code: i64) -> String {
        json!({
            "error": {
                "message": "boom",
                "type": "OAuthException",
                "code": code,
                "fbtrace_id": "AbC"
            }
        })
        .to_string()
    }

    #[test]
    fn code_190_is_invalid_token() {
        let err = classify(400, &graph_error(190), CredentialSource::OAuthCache);
        assert_eq!(err.kind(), "InvalidOrExpiredToken");
        assert!(!err.is_retryable());
        assert!(err.remediation().unwrap().contains("--login"));
    }

    #[test]
    fn http_401_is_invalid_token() {
        let err = classify(401, "", CredentialSource::EnvToken);
        assert_eq!(err.kind(), "InvalidOrExpiredToken");
        assert!(err.remediation().unwrap().contains("META_ACCESS_TOKEN"));
    }

    #[test]
    fn permission_codes() {
        for code in [10, 200, 294] {
            assert_eq!(
                classify(400, &graph_error(code), CredentialSource::EnvToken).kind(),
                "InsufficientPermission"
            );
        }
        assert_eq!(
            classify(403, "forbidden", CredentialSource::EnvToken).kind(),
            "InsufficientPermission"
        );
    }

    #[test]
    fn throttling_codes() {
        for code in [4, 17, 32, 613, 80_004] {
            let err = classify(400, &graph_error(code), CredentialSource::EnvToken);
            assert_eq!(err.kind(), "RateLimited");
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn server_errors_are_upstream_unavailable() {
        let err = classify(503, "Service Unavailable", CredentialSource::EnvToken);
        assert_eq!(err.kind(), "UpstreamUnavailable");
        assert!(err.is_retryable());
    }

    #[test]
    fn other_client_errors_carry_provider_message() {
        let err = classify(
            400,
            &json!({"error": {"message": "Invalid parameter", "code": 100, "error_subcode": 1_487_390}})
                .to_string(),
            CredentialSource::EnvToken,
        );
        assert_eq!(err.kind(), "InvalidRequest");
        assert!(err.to_string().contains("Invalid parameter"));
        let envelope = crate::error::ToolError::from(err).envelope();
        assert_eq!(envelope["error"]["details"]["error_subcode"], 1_487_390);
    }

    #[test]
    fn provider_message_is_sanitized() {
        let body = json!({"error": {"message": "bad url https://x/?access_token=EAAB999", "code": 100}})
            .to_string();
        let err = classify(400, &body, CredentialSource::EnvToken);
        assert!(!err.to_string().contains("EAAB999"));
    }
}
