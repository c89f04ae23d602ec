//! Successful tool results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graph::paging::{self, PageCursor};

/// Outcome marker carried in every result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The provider call succeeded.
    Success,
    /// The call failed; see the error envelope.
    Error,
}

/// A successful Graph API result as returned to the MCP client.
///
/// For list endpoints `data` is the array of items on this page and
/// `next_page_cursor` is absent on the last page. Other top-level members of
/// a list payload (`summary`, for example) are carried through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Always [`ResponseStatus::Success`].
    pub status: ResponseStatus,
    /// Items (list endpoints) or the object itself.
    pub data: Value,
    /// Provider `paging` object, unmodified apart from redaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Value>,
    /// Cursor to pass as `page_cursor` for the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_cursor: Option<PageCursor>,
    /// Provider members returned beside `data`.
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

const RESERVED_KEYS: &[&str] = &["status", "data", "paging", "next_page_cursor"];

impl ApiResponse {
    /// Shapes a provider body into a result.
    #[must_use]
    pub fn from_body(body: Value, paginated: bool) -> Self {
        if !paginated {
            return Self {
                status: ResponseStatus::Success,
                data: body,
                paging: None,
                next_page_cursor: None,
                extra: Map::new(),
            };
        }

        let mut page = paging::wrap(body);
        for key in RESERVED_KEYS {
            if page.extra.remove(*key).is_some() {
                tracing::debug!(key, "Dropped provider member that clashes with the result envelope");
            }
        }
        Self {
            status: ResponseStatus::Success,
            data: Value::Array(page.items),
            paging: page.paging,
            next_page_cursor: page.cursor,
            extra: page.extra,
        }
    }

    /// Whether another page exists.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.next_page_cursor.is_some()
    }

    /// JSON form sent to the client.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
