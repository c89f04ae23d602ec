//! Loopback HTTP listener that receives the OAuth redirect.

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Query, response::Html, routing::get, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

use crate::error::AuthError;

/// Query parameters delivered to `/callback`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code.
    #[serde(default)]
    pub code: Option<String>,
    /// Anti-forgery state echoed by the provider.
    #[serde(default)]
    pub state: Option<String>,
    /// Provider error code, e.g. `access_denied`.
    #[serde(default)]
    pub error: Option<String>,
    /// Provider error description.
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A bound, not yet serving, callback listener.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Binds the first free loopback port in `start_port..start_port + attempts`.
    ///
    /// A `start_port` of 0 lets the OS pick an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CallbackUnavailable`] if no port could be bound.
    pub async fn bind(start_port: u16, attempts: u16) -> Result<Self, AuthError> {
        let mut last_error = None;

        for offset in 0..attempts.max(1) {
            let Some(port) = start_port.checked_add(offset) else {
                break;
            };
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => {
                    let port = listener
                        .local_addr()
                        .map_err(|e| AuthError::CallbackUnavailable {
                            message: e.to_string(),
                        })?
                        .port();
                    tracing::info!(port, "OAuth callback listener bound");
                    return Ok(Self { listener, port });
                }
                Err(e) => {
                    tracing::debug!(port, error = %e, "Callback port unavailable");
                    last_error = Some(e);
                }
            }
        }

        Err(AuthError::CallbackUnavailable {
            message: format!(
                "no free port in {start_port}..{} ({})",
                u32::from(start_port) + u32::from(attempts),
                last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string())
            ),
        })
    }

    /// Port the listener is bound to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register with the provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Serves `/callback` until the first redirect arrives or `timeout` elapses.
    ///
    /// The browser is shown the success page only for a code carrying
    /// `expected_state`; the caller still validates the returned parameters.
    /// The listener is shut down before returning.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::LoginTimedOut`] if no callback arrives in time.
    pub async fn wait(self, timeout: Duration, expected_state: &str) -> Result<CallbackParams, AuthError> {
        let (tx, rx) = oneshot::channel::<CallbackParams>();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let expected_state: Arc<str> = Arc::from(expected_state);

        let callback_handler = {
            let tx = tx.clone();
            move |Query(params): Query<CallbackParams>| {
                let tx = tx.clone();
                let expected_state = expected_state.clone();
                async move {
                    let page = callback_page(&params, &expected_state);
                    if let Some(sender) = tx.lock().await.take() {
                        let _ = sender.send(params);
                    }
                    Html(page)
                }
            }
        };

        let app = Router::new().route("/callback", get(callback_handler));
        let server = axum::serve(self.listener, app);
        let server_handle = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "OAuth callback listener stopped");
            }
        });

        let result = tokio::time::timeout(timeout, rx).await;
        server_handle.abort();

        match result {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::CallbackUnavailable {
                message: "callback listener closed unexpectedly".to_string(),
            }),
            Err(_) => Err(AuthError::LoginTimedOut {
                seconds: timeout.as_secs(),
            }),
        }
    }
}

/// Page shown in the browser for a callback.
fn callback_page(params: &CallbackParams, expected_state: &str) -> &'static str {
    let accepted = params.error.is_none()
        && params.code.is_some()
        && params.state.as_deref() == Some(expected_state);
    if accepted {
        SUCCESS_HTML
    } else {
        FAILURE_HTML
    }
}

const SUCCESS_HTML: &str = r"<!DOCTYPE html>
<html>
<head><title>Meta Ads MCP</title></head>
<body>
    <h1>Authorization received</h1>
    <p>You can close this window and return to your terminal.</p>
</body>
</html>";

const FAILURE_HTML: &str = r"<!DOCTYPE html>
<html>
<head><title>Meta Ads MCP</title></head>
<body>
    <h1>Authorization failed</h1>
    <p>Return to your terminal for details.</p>
</body>
</html>";
