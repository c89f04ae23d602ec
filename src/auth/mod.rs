//! Credentials: resolution, caching, the per-call guard, and `--login`.

pub mod callback;
mod credential;
mod guard;
pub mod login;
mod store;

pub use credential::{Credential, CredentialSource, TokenCacheRecord};
pub use guard::AuthGuard;
pub use login::{BrowserLauncher, LoginFlow, LoginSettings, LoginState, SystemBrowser};
pub use store::{default_cache_path, CredentialStore};
