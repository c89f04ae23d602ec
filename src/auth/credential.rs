//! Credential and token cache record types.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the active credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialSource {
    /// Static token from `META_ACCESS_TOKEN`.
    #[serde(rename = "env-token")]
    EnvToken,
    /// Token cached by a previous `--login` run.
    #[serde(rename = "oauth-cache")]
    OAuthCache,
}

impl CredentialSource {
    /// Stable tag used in structured output.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::EnvToken => "env-token",
            Self::OAuthCache => "oauth-cache",
        }
    }

    /// Short label used in log lines. Log lines never carry token bytes.
    #[must_use]
    pub const fn log_label(self) -> &'static str {
        match self {
            Self::EnvToken => "env",
            Self::OAuthCache => "oauth-cache",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A resolved bearer credential.
///
/// Immutable once constructed; a new login writes the cache file but never
/// mutates a credential that is already in use.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    source: CredentialSource,
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
    scopes: BTreeSet<String>,
}

impl Credential {
    /// Creates a credential from a static environment token.
    #[must_use]
    pub fn from_env(access_token: impl Into<String>) -> Self {
        Self {
            source: CredentialSource::EnvToken,
            access_token: access_token.into(),
            expires_at: None,
            scopes: BTreeSet::new(),
        }
    }

    /// Creates a credential from a cached login record.
    #[must_use]
    pub fn from_cache(record: &TokenCacheRecord) -> Self {
        Self {
            source: CredentialSource::OAuthCache,
            access_token: record.access_token.clone(),
            expires_at: record.expires_at(),
            scopes: record.scopes.iter().cloned().collect(),
        }
    }

    /// Where this credential came from.
    #[must_use]
    pub const fn source(&self) -> CredentialSource {
        self.source
    }

    /// The bearer token. Never log this value.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Expiry time, if the provider reported one.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Scopes granted at login (empty for static tokens).
    #[must_use]
    pub const fn scopes(&self) -> &BTreeSet<String> {
        &self.scopes
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Persisted form of an OAuth-derived credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCacheRecord {
    /// The bearer token.
    pub access_token: String,
    /// App the token was issued to.
    pub app_id: String,
    /// When the token was obtained.
    pub obtained_at: DateTime<Utc>,
    /// Lifetime in seconds reported by the provider.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Scopes requested at login.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Whether the short-lived token was upgraded to a long-lived one.
    #[serde(default)]
    pub long_lived: bool,
    /// Token endpoint response, with secret members redacted.
    #[serde(default)]
    pub raw_provider_response: Value,
}

impl TokenCacheRecord {
    /// Creates a record obtained now.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        app_id: impl Into<String>,
        raw_provider_response: Value,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            app_id: app_id.into(),
            obtained_at: Utc::now(),
            expires_in: None,
            scopes: Vec::new(),
            long_lived: false,
            raw_provider_response,
        }
    }

    /// Absolute expiry time, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expires_in?).ok()?;
        self.obtained_at.checked_add_signed(Duration::seconds(secs))
    }

    /// Returns `true` if the record has a known expiry at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for TokenCacheRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCacheRecord")
            .field("access_token", &"<redacted>")
            .field("app_id", &self.app_id)
            .field("obtained_at", &self.obtained_at)
            .field("expires_in", &self.expires_in)
            .field("scopes", &self.scopes)
            .field("long_lived", &self.long_lived)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_debug_never_prints_token() {
        let credential = Credential::from_env("EAAB-very-secret-token-value");
        let printed = format!("{credential:?}");
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("EnvToken"));
    }

    #[test]
    fn record_expiry() {
        let mut record = TokenCacheRecord::new("token", "123", json!({}));
        assert!(record.expires_at().is_none());
        assert!(!record.is_expired_at(Utc::now()));

        record.expires_in = Some(60);
        let expiry = record.expires_at().unwrap();
        assert_eq!(expiry - record.obtained_at, Duration::seconds(60));
        assert!(!record.is_expired_at(record.obtained_at));
        assert!(record.is_expired_at(record.obtained_at + Duration::seconds(61)));
    }

    #[test]
    fn credential_from_cache_carries_scopes_and_expiry() {
        let mut record = TokenCacheRecord::new("token", "123", json!({}));
        record.expires_in = Some(3600);
        record.scopes = vec!["ads_read".into(), "ads_read".into(), "pages_show_list".into()];
        let credential = Credential::from_cache(&record);
        assert_eq!(credential.source(), CredentialSource::OAuthCache);
        assert_eq!(credential.expires_at(), record.expires_at());
        assert_eq!(credential.scopes().len(), 2);
    }

    #[test]
    fn old_records_without_optional_fields_parse() {
        let record: TokenCacheRecord = serde_json::from_value(json!({
            "access_token": "token",
            "app_id": "123",
            "obtained_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(record.expires_in.is_none());
        assert!(record.scopes.is_empty());
        assert!(!record.long_lived);
    }

    #[test]
    fn source_tags_are_stable() {
        assert_eq!(CredentialSource::EnvToken.tag(), "env-token");
        assert_eq!(CredentialSource::OAuthCache.tag(), "oauth-cache");
        assert_eq!(CredentialSource::EnvToken.log_label(), "env");
        assert_eq!(
            serde_json::to_value(CredentialSource::OAuthCache).unwrap(),
            json!("oauth-cache")
        );
    }
}
