//! Secret redaction for anything that leaves the process.
//!
//! Meta embeds the caller's token in `paging.next`/`paging.previous` URLs and
//! occasionally echoes request URLs in error bodies. Every string in a
//! response is scanned for secret query parameters; only their values are
//! replaced, the rest of the string is kept byte for byte. Parameters inside a
//! percent-encoded nested URL (`%3Faccess_token%3D...`, as found in link-shim
//! redirects) are matched as well.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Replacement for redacted values.
pub const REDACTED: &str = "REDACTED";

/// Parameter and member names whose values are always redacted.
pub const SECRET_KEYS: &[&str] = &[
    "access_token",
    "client_secret",
    "fb_exchange_token",
    "appsecret_proof",
    "input_token",
];

fn secret_param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let names = SECRET_KEYS.join("|");
        // Boundary: start, a non-word byte, or an escaped byte. The value ends
        // at `&`, `#`, whitespace, quotes, or their escapes `%26` and `%23`.
        Regex::new(&format!(
            r#"(?i)(^|[^a-z0-9_%]|%[0-9a-f]{{2}})({names})(=|%3D)(?:[^&#%\s"'<>]|%(?:[013-9a-f][0-9a-f]|2[0-24-57-9a-f]))*"#
        ))
        .unwrap_or_else(|e| unreachable!("secret parameter pattern is valid: {e}"))
    })
}

/// Returns `true` if `key` names a secret-bearing parameter.
pub(crate) fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|s| s.eq_ignore_ascii_case(key))
}

/// Redacts secret query parameter values inside a string.
#[must_use]
pub fn sanitize_str(input: &str) -> String {
    let pattern = secret_param_pattern();
    if !pattern.is_match(input) {
        return input.to_string();
    }
    pattern
        .replace_all(input, format!("${{1}}${{2}}${{3}}{REDACTED}"))
        .into_owned()
}

/// Recursively redacts secrets in a JSON value.
///
/// Applying this twice yields the same value as applying it once.
#[must_use]
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let value = if is_secret_key(&key) && value.is_string() {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize(value)
                    };
                    (key, value)
                })
                .collect(),
        ),
        other => other,
    }
}
