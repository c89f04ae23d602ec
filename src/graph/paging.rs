//! Cursor pagination and date-range normalization.
//!
//! A list-style result always carries `items` and, when more pages exist, an
//! opaque forward cursor taken verbatim from `paging.cursors.after`. No
//! cursor means the last page. The raw `paging` object is kept as-is for
//! callers that want `before` or the provider's `next` link, and any other
//! top-level members (`summary`, for example) travel alongside the items.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ApiError;

/// Query parameter a cursor is replayed as.
pub const CURSOR_PARAM: &str = "after";

/// Opaque forward pagination token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageCursor(String);

impl PageCursor {
    /// Wraps a provider cursor. Empty strings are not cursors.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        (!raw.is_empty()).then_some(Self(raw))
    }

    /// The cursor exactly as the provider issued it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Cursors can be long base64 blobs; keep logs readable.
        let shown: String = self.0.chars().take(12).collect();
        write!(f, "PageCursor({shown}…)")
    }
}

/// One page of a list-style response.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Items on this page.
    pub items: Vec<Value>,
    /// Forward cursor, absent on the last page.
    pub cursor: Option<PageCursor>,
    /// Provider `paging` object, unmodified.
    pub paging: Option<Value>,
    /// Remaining top-level members of a list payload, such as `summary`.
    pub extra: Map<String, Value>,
}

/// Splits a provider list payload into items and forward cursor.
///
/// A payload without a `data` array is treated as a single item.
#[must_use]
pub fn wrap(raw: Value) -> Page {
    let Value::Object(mut body) = raw else {
        return Page {
            items: vec![raw],
            cursor: None,
            paging: None,
            extra: Map::new(),
        };
    };

    let paging = body.remove("paging");
    let cursor = paging
        .as_ref()
        .and_then(|p| p.pointer("/cursors/after"))
        .and_then(Value::as_str)
        .and_then(PageCursor::new);

    let (items, extra) = match body.remove("data") {
        Some(Value::Array(items)) => (items, body),
        Some(other) => (vec![other], body),
        None => (vec![Value::Object(body)], Map::new()),
    };

    Page {
        items,
        cursor,
        paging,
        extra,
    }
}

/// Returns the query parameter that replays `cursor`.
#[must_use]
pub fn unwrap(cursor: &PageCursor) -> (&'static str, String) {
    (CURSOR_PARAM, cursor.0.clone())
}

const DATE_PRESET_ALIASES: &[(&str, &str)] = &[
    ("previous_3d", "last_3d"),
    ("previous_7d", "last_7d"),
    ("previous_14d", "last_14d"),
    ("previous_28d", "last_28d"),
    ("previous_30d", "last_30d"),
    ("previous_90d", "last_90d"),
];

/// Maps legacy preset aliases onto Meta's names. Other presets pass through.
#[must_use]
pub fn normalize_date_preset(raw: &str) -> String {
    let preset = raw.trim().to_ascii_lowercase();
    DATE_PRESET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == preset)
        .map_or(preset, |(alias, canonical)| {
            tracing::debug!(alias, canonical, "Applied date preset alias");
            (*canonical).to_string()
        })
}

/// A date range in one of its two accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRange {
    /// Named preset such as `last_30d` or `maximum`.
    Preset(String),
    /// Explicit `YYYY-MM-DD` bounds.
    Custom {
        /// First day.
        since: String,
        /// Last day.
        until: String,
    },
}

impl DateRange {
    /// Parses a string preset or a `{since, until}` object.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] for an empty preset, an object
    /// missing either bound, or any other JSON shape.
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Self::Preset(normalize_date_preset(s))),
            Value::Object(map) => {
                let bound = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                match (bound("since"), bound("until")) {
                    (Some(since), Some(until)) => Ok(Self::Custom { since, until }),
                    _ => Err(ApiError::invalid_request(
                        "custom date range must contain both 'since' and 'until' (YYYY-MM-DD)",
                    )),
                }
            }
            _ => Err(ApiError::invalid_request(
                "date range must be a preset name or a {since, until} object",
            )),
        }
    }

    /// The Graph API parameter this range is sent as, and its value.
    #[must_use]
    pub fn to_query_param(&self) -> (&'static str, String) {
        match self {
            Self::Preset(preset) => ("date_preset", preset.clone()),
            Self::Custom { since, until } => (
                "time_range",
                json!({ "since": since, "until": until }).to_string(),
            ),
        }
    }
}

/// Maximum number of issued cursors remembered.
pub const LEDGER_CAPACITY: usize = 256;

/// Remembers which query each issued cursor belongs to.
///
/// A cursor replayed against a different tool, or with different filters,
/// would silently page through an unrelated result set; the ledger turns
/// that into an error. Cursors it has never seen (for example after a
/// restart) are let through.
#[derive(Debug, Default)]
pub struct CursorLedger {
    /// Insertion order is eviction order.
    entries: IndexMap<PageCursor, (String, String)>,
}

impl CursorLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remembered cursors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no cursor is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a cursor issued for `tool` with parameter `fingerprint`.
    pub fn record(&mut self, cursor: &PageCursor, tool: &str, fingerprint: &str) {
        let binding = (tool.to_string(), fingerprint.to_string());
        self.entries.insert(cursor.clone(), binding);
        while self.entries.len() > LEDGER_CAPACITY {
            self.entries.shift_remove_index(0);
        }
    }

    /// Checks that `cursor` is replayed against the query that issued it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the cursor is known and was
    /// issued for another tool or another parameter set.
    pub fn check(&self, cursor: &PageCursor, tool: &str, fingerprint: &str) -> Result<(), ApiError> {
        match self.entries.get(cursor) {
            Some((issued_tool, _)) if issued_tool != tool => Err(ApiError::invalid_request(format!(
                "page_cursor was issued by '{issued_tool}' and cannot be used with '{tool}'"
            ))),
            Some((_, issued_fingerprint)) if issued_fingerprint != fingerprint => {
                Err(ApiError::invalid_request(
                    "page_cursor was issued for different filter parameters; \
                     repeat the original parameters or start from the first page",
                ))
            }
            _ => Ok(()),
        }
    }
}
