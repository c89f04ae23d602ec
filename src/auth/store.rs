//! Credential resolution and the on-disk token cache.
//!
//! Resolution order:
//!
//! 1. `META_ACCESS_TOKEN`, if non-empty (never persisted)
//! 2. The token cache file written by `--login`
//! 3. Otherwise [`AuthError::AuthenticationRequired`]
//!
//! Nothing is memoised: each [`CredentialStore::resolve`] call re-reads the
//! environment snapshot it is given and the cache file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::auth::credential::{Credential, TokenCacheRecord};
use crate::config::Environment;
use crate::error::AuthError;

const CACHE_DIR_NAME: &str = "meta-ads-mcp";
const CACHE_FILE_NAME: &str = "token_cache.json";

/// Returns the platform-specific token cache path.
///
/// - **Linux:** `~/.config/meta-ads-mcp/token_cache.json`
/// - **macOS:** `~/Library/Application Support/meta-ads-mcp/token_cache.json`
/// - **Windows:** `%APPDATA%\meta-ads-mcp\token_cache.json`
#[must_use]
pub fn default_cache_path() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(CACHE_DIR_NAME).join(CACHE_FILE_NAME)
}

/// Resolves and persists the active credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    cache_path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by the given cache file.
    #[must_use]
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }

    /// Creates a store at `override_path`, or the platform default.
    #[must_use]
    pub fn from_config(override_path: Option<&Path>) -> Self {
        Self::new(override_path.map_or_else(default_cache_path, Path::to_path_buf))
    }

    /// Path of the cache file.
    #[must_use]
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Resolves the credential for one call.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AuthenticationRequired`] if neither a static token
    /// nor a usable cached token is available.
    pub fn resolve(&self, env: &Environment) -> Result<Credential, AuthError> {
        if let Some(ref token) = env.access_token {
            tracing::debug!(source = "env", "Resolved credential");
            return Ok(Credential::from_env(token.clone()));
        }

        let Some(record) = self.load() else {
            return Err(AuthError::AuthenticationRequired {
                reason: format!(
                    "META_ACCESS_TOKEN is not set and no cached login token exists at {}",
                    self.cache_path.display()
                ),
            });
        };

        if record.is_expired_at(Utc::now()) {
            tracing::warn!(
                path = %self.cache_path.display(),
                "Cached login token has expired"
            );
            return Err(AuthError::AuthenticationRequired {
                reason: "the cached login token has expired".to_string(),
            });
        }

        tracing::debug!(source = "oauth-cache", "Resolved credential");
        Ok(Credential::from_cache(&record))
    }

    /// Reads the cache file.
    ///
    /// Returns `None` when the file is missing, unreadable, malformed, or
    /// holds an empty token. The file is never deleted here.
    #[must_use]
    pub fn load(&self) -> Option<TokenCacheRecord> {
        let contents = match fs::read_to_string(&self.cache_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(
                    path = %self.cache_path.display(),
                    error = %e,
                    "Failed to read token cache"
                );
                return None;
            }
        };

        match serde_json::from_str::<TokenCacheRecord>(&contents) {
            Ok(record) if record.access_token.trim().is_empty() => {
                tracing::warn!(path = %self.cache_path.display(), "Token cache holds an empty token");
                None
            }
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    path = %self.cache_path.display(),
                    error = %e,
                    "Ignoring malformed token cache"
                );
                None
            }
        }
    }

    /// Writes the cache file atomically.
    ///
    /// The record is written to a sibling temporary file, flushed to disk,
    /// and renamed over the target, so readers see either the previous file
    /// or the complete new one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CachePersist`] if any filesystem step fails.
    pub fn persist(&self, record: &TokenCacheRecord) -> Result<(), AuthError> {
        let persist_err = |source| AuthError::CachePersist {
            path: self.cache_path.clone(),
            source,
        };

        if let Some(parent) = self.cache_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }

        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| persist_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let tmp_path = self.temp_path();
        let result = write_synced(&tmp_path, &json).and_then(|()| fs::rename(&tmp_path, &self.cache_path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(persist_err(e));
        }

        tracing::info!(path = %self.cache_path.display(), "Token cache updated");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .cache_path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| CACHE_FILE_NAME.into());
        name.push(".tmp");
        self.cache_path.with_file_name(name)
    }
}

fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents)?;
    file.sync_all()
}
