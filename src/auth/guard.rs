//! Gate in front of every tool call.
//!
//! The guard resolves a credential before any network I/O and fails fast
//! with [`AuthError::AuthenticationRequired`] otherwise. It never starts the
//! interactive login: that is a separate entry point (`--login`).

use crate::auth::credential::Credential;
use crate::auth::store::CredentialStore;
use crate::config::Environment;
use crate::error::AuthError;
use crate::graph::ToolRequest;

/// Source of environment snapshots for the guard.
type EnvSource = Box<dyn Fn() -> Environment + Send + Sync>;

/// Resolves a credential for each tool invocation.
pub struct AuthGuard {
    store: CredentialStore,
    environment: EnvSource,
}

impl AuthGuard {
    /// Creates a guard that snapshots the process environment on every call.
    ///
    /// `app_id_override` (from `--app-id`) is applied to each snapshot.
    #[must_use]
    pub fn new(store: CredentialStore, app_id_override: Option<String>) -> Self {
        Self::with_environment(store, move || {
            Environment::capture().with_app_id(app_id_override.clone())
        })
    }

    /// Creates a guard with a custom environment source.
    #[must_use]
    pub fn with_environment(
        store: CredentialStore,
        environment: impl Fn() -> Environment + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            environment: Box::new(environment),
        }
    }

    /// The underlying credential store.
    #[must_use]
    pub const fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Resolves the credential for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AuthenticationRequired`] if no credential is available.
    pub fn guard(&self, request: &ToolRequest) -> Result<Credential, AuthError> {
        let env = (self.environment)();
        match self.store.resolve(&env) {
            Ok(credential) => {
                tracing::debug!(
                    tool = %request.tool_name(),
                    source = credential.source().log_label(),
                    "Tool call authorised"
                );
                Ok(credential)
            }
            Err(e) => {
                tracing::info!(
                    tool = %request.tool_name(),
                    "Tool call rejected: no credential available"
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGuard")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
