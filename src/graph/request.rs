//! Tool requests and outbound request construction.
//!
//! [`build_request`] is pure: it turns an endpoint template and a tool
//! request into a [`PreparedRequest`] without touching the network or the
//! credential, so the exact outbound request can be inspected in tests.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};
use url::Url;

use crate::error::ApiError;
use crate::graph::paging::{self, DateRange, PageCursor, CURSOR_PARAM};
use crate::graph::sanitize::is_secret_key;

/// Friendly argument names accepted by tools, and the Graph API names they map to.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("page_size", "limit"),
    ("date_range", "time_range"),
    ("ad_set_id", "adset_id"),
    ("ad_creative_id", "creative_id"),
    ("facebook_page_id", "page_id"),
    ("ad_image_hash", "image_hash"),
    ("ad_image_hashes", "image_hashes"),
    ("ad_video_id", "video_id"),
    ("lead_form_id", "lead_gen_form_id"),
    ("primary_text", "message"),
    ("description_text", "description"),
    ("image_source_url", "image_url"),
];

/// Argument names that carry a page cursor.
const CURSOR_ARGUMENTS: &[&str] = &["page_cursor", CURSOR_PARAM];

/// Query parameters that change between pages of the same query.
const PAGINATION_PARAMS: &[&str] = &[CURSOR_PARAM, "before", "limit"];

/// HTTP method of a Graph API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read.
    Get,
    /// Create or update.
    Post,
    /// Delete.
    Delete,
}

impl HttpMethod {
    /// Method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Graph API endpoint a tool maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template below the version segment, e.g. `{ad_account_id}/campaigns`.
    pub path: &'static str,
    /// Whether responses are cursor-paginated lists.
    pub paginated: bool,
    /// Parameters sent when the caller does not supply them.
    pub defaults: &'static [(&'static str, &'static str)],
}

impl Endpoint {
    const fn new(method: HttpMethod, path: &'static str) -> Self {
        Self {
            method,
            path,
            paginated: false,
            defaults: &[],
        }
    }

    /// A read endpoint.
    #[must_use]
    pub const fn get(path: &'static str) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// A create/update endpoint.
    #[must_use]
    pub const fn post(path: &'static str) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// A delete endpoint.
    #[must_use]
    pub const fn delete(path: &'static str) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Marks the endpoint as a cursor-paginated list.
    #[must_use]
    pub const fn paginated(self) -> Self {
        Self {
            paginated: true,
            ..self
        }
    }

    /// Sets default parameters.
    #[must_use]
    pub const fn with_defaults(self, defaults: &'static [(&'static str, &'static str)]) -> Self {
        Self { defaults, ..self }
    }

    /// Only reads are safe to retry.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        matches!(self.method, HttpMethod::Get)
    }
}

/// One tool invocation: name, arguments, and optional page cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    tool_name: String,
    parameters: Map<String, Value>,
    page_cursor: Option<PageCursor>,
}

impl ToolRequest {
    /// Creates a request for the first page.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
            page_cursor: None,
        }
    }

    /// Creates a request from MCP `tools/call` arguments.
    ///
    /// A `page_cursor` (or `after`) argument is lifted out of the parameters
    /// into the request's cursor.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the cursor argument is not a string.
    pub fn from_arguments(
        tool_name: impl Into<String>,
        mut arguments: Map<String, Value>,
    ) -> Result<Self, ApiError> {
        let mut cursor = None;
        for key in CURSOR_ARGUMENTS {
            match arguments.remove(*key) {
                None | Some(Value::Null) => {}
                Some(Value::String(raw)) => cursor = cursor.or_else(|| PageCursor::new(raw)),
                Some(_) => {
                    return Err(ApiError::invalid_request(format!(
                        "'{key}' must be the string cursor returned by a previous page"
                    )))
                }
            }
        }
        Ok(Self {
            tool_name: tool_name.into(),
            parameters: arguments,
            page_cursor: cursor,
        })
    }

    /// Returns a copy of this request positioned at `cursor`.
    #[must_use]
    pub fn with_cursor(mut self, cursor: PageCursor) -> Self {
        self.page_cursor = Some(cursor);
        self
    }

    /// Tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Tool arguments, cursor excluded.
    #[must_use]
    pub const fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Cursor of the requested page, if not the first.
    #[must_use]
    pub const fn page_cursor(&self) -> Option<&PageCursor> {
        self.page_cursor.as_ref()
    }
}

/// A fully built outbound request. Carries no credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL without query string.
    pub url: Url,
    /// Query string pairs for GET/DELETE, form fields for POST.
    pub query: Vec<(String, String)>,
    /// Whether the pipeline may retry this request.
    pub idempotent: bool,
}

impl PreparedRequest {
    /// Looks up a query parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Identifies the query independent of which page is requested.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.method.hash(&mut hasher);
        self.url.as_str().hash(&mut hasher);
        let mut filters: Vec<_> = self
            .query
            .iter()
            .filter(|(k, _)| !PAGINATION_PARAMS.contains(&k.as_str()))
            .collect();
        filters.sort();
        filters.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Builds the outbound request for `request` against `endpoint`.
///
/// Placeholders in the path template are filled from the parameters and
/// percent-encoded; friendly argument names are mapped onto Graph API names;
/// date ranges are normalized; nested objects and arrays are JSON-encoded;
/// the cursor, if any, is appended last as `after`.
///
/// # Errors
///
/// Returns [`ApiError::InvalidRequest`] for a missing placeholder value, a
/// malformed date range, or a credential passed as an argument.
pub fn build_request(
    base_url: &str,
    api_version: &str,
    endpoint: &Endpoint,
    request: &ToolRequest,
) -> Result<PreparedRequest, ApiError> {
    if let Some(key) = request.parameters().keys().find(|k| is_secret_key(k)) {
        return Err(ApiError::invalid_request(format!(
            "'{key}' cannot be passed as a tool argument; credentials are supplied by the server"
        )));
    }

    let Value::Object(mut params) = remap_keys(Value::Object(request.parameters().clone())) else {
        return Err(ApiError::invalid_request("tool arguments must be an object"));
    };

    let url = build_url(base_url, api_version, endpoint.path, &mut params)?;
    let mut query = date_range_params(&mut params)?;

    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::String(s) => query.push((key, s)),
            Value::Bool(_) | Value::Number(_) => query.push((key, value.to_string())),
            nested @ (Value::Array(_) | Value::Object(_)) => query.push((key, nested.to_string())),
        }
    }

    for (key, value) in endpoint.defaults {
        if !query.iter().any(|(k, _)| k == key) {
            query.push(((*key).to_string(), (*value).to_string()));
        }
    }

    if let Some(cursor) = request.page_cursor() {
        let (name, value) = paging::unwrap(cursor);
        query.retain(|(k, _)| k != name);
        query.push((name.to_string(), value));
    }

    Ok(PreparedRequest {
        method: endpoint.method,
        url,
        query,
        idempotent: endpoint.is_idempotent(),
    })
}

fn alias_for(key: &str) -> Option<&'static str> {
    KEY_ALIASES
        .iter()
        .find(|(friendly, _)| *friendly == key)
        .map(|(_, graph)| *graph)
}

fn remap_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let key = alias_for(&k).map_or(k, str::to_string);
                    (key, remap_keys(v))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(remap_keys).collect()),
        other => other,
    }
}

fn build_url(
    base_url: &str,
    api_version: &str,
    template: &str,
    params: &mut Map<String, Value>,
) -> Result<Url, ApiError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ApiError::invalid_request(format!("invalid Graph API base URL: {e}")))?;

    let mut segments = vec![api_version.to_string()];
    for part in template.split('/').filter(|s| !s.is_empty()) {
        match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => segments.push(placeholder_value(name, params.remove(name))?),
            None => segments.push(part.to_string()),
        }
    }

    url.path_segments_mut()
        .map_err(|()| ApiError::invalid_request("Graph API base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(&segments);
    Ok(url)
}

fn placeholder_value(name: &str, value: Option<Value>) -> Result<String, ApiError> {
    let raw = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if raw.is_empty() {
        return Err(ApiError::invalid_request(format!(
            "missing required parameter '{name}'"
        )));
    }
    if name == "ad_account_id" && !raw.starts_with("act_") {
        return Ok(format!("act_{raw}"));
    }
    Ok(raw)
}

fn date_range_params(params: &mut Map<String, Value>) -> Result<Vec<(String, String)>, ApiError> {
    let mut out = Vec::new();

    if let Some(preset) = params.remove("date_preset") {
        let Value::String(ref raw) = preset else {
            return Err(ApiError::invalid_request("'date_preset' must be a string"));
        };
        out.push(("date_preset".to_string(), paging::normalize_date_preset(raw)));
    }

    if let Some(range) = params.remove("time_range") {
        let (name, value) = DateRange::from_value(&range)?.to_query_param();
        if out.iter().any(|(k, _)| k == name) {
            return Err(ApiError::invalid_request(
                "pass either a date preset or a custom date range, not both",
            ));
        }
        out.push((name.to_string(), value));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BASE: &str = "https://graph.facebook.com";

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn build(endpoint: &Endpoint, request: &ToolRequest) -> PreparedRequest {
        build_request(BASE, "v25.0", endpoint, request).unwrap()
    }

    #[test]
    fn fills_path_and_prefixes_account_id() {
        let endpoint = Endpoint::get("{ad_account_id}/campaigns").paginated();
        let request = ToolRequest::new("list_campaigns", args(json!({"ad_account_id": "123"})));
        let prepared = build(&endpoint, &request);
        assert_eq!(
            prepared.url.as_str(),
            "https://graph.facebook.com/v25.0/act_123/campaigns"
        );
        assert!(prepared.idempotent);
        assert!(prepared.query.is_empty());
    }

    #[test]
    fn placeholder_is_percent_encoded() {
        let endpoint = Endpoint::get("{campaign_id}");
        let request = ToolRequest::new("read_campaign", args(json!({"campaign_id": "12/../me"})));
        let prepared = build(&endpoint, &request);
        assert_eq!(prepared.url.path(), "/v25.0/12%2F..%2Fme");
    }

    #[test]
    fn missing_placeholder_is_invalid_request() {
        let endpoint = Endpoint::get("{campaign_id}");
        let request = ToolRequest::new("read_campaign", Map::new());
        let err = build_request(BASE, "v25.0", &endpoint, &request).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");
        assert!(err.to_string().contains("campaign_id"));
    }

    #[test]
    fn friendly_keys_are_remapped() {
        let endpoint = Endpoint::get("{ad_account_id}/ads");
        let request = ToolRequest::new(
            "list_ads",
            args(json!({"ad_account_id": "act_1", "page_size": 5, "ad_set_id": "42"})),
        );
        let prepared = build(&endpoint, &request);
        assert_eq!(prepared.param("limit"), Some("5"));
        assert_eq!(prepared.param("adset_id"), Some("42"));
        assert!(prepared.param("page_size").is_none());
    }

    #[test]
    fn previous_30d_is_normalized_before_sending() {
        let endpoint = Endpoint::get("{object_id}/insights").paginated();
        let request = ToolRequest::new(
            "list_insights",
            args(json!({"object_id": "act_1", "date_range": "previous_30d"})),
        );
        let prepared = build(&endpoint, &request);
        assert_eq!(prepared.param("date_preset"), Some("last_30d"));
        assert!(prepared.param("time_range").is_none());
    }

    #[test]
    fn custom_range_and_nested_values_are_json_encoded() {
        let endpoint = Endpoint::get("{object_id}/insights");
        let request = ToolRequest::new(
            "list_insights",
            args(json!({
                "object_id": "act_1",
                "date_range": {"since": "2026-01-01", "until": "2026-01-31"},
                "filtering": [{"field": "objective", "operator": "IN", "value": ["OUTCOME_SALES"]}],
                "breakdowns": "age,gender",
                "is_test": true,
                "unused": null
            })),
        );
        let prepared = build(&endpoint, &request);
        let range: Value = serde_json::from_str(prepared.param("time_range").unwrap()).unwrap();
        assert_eq!(range, json!({"since": "2026-01-01", "until": "2026-01-31"}));
        let filtering: Value = serde_json::from_str(prepared.param("filtering").unwrap()).unwrap();
        assert_eq!(filtering[0]["operator"], "IN");
        assert_eq!(prepared.param("breakdowns"), Some("age,gender"));
        assert_eq!(prepared.param("is_test"), Some("true"));
        assert!(prepared.param("unused").is_none());
    }

    #[test]
    fn incomplete_custom_range_is_rejected() {
        let endpoint = Endpoint::get("{object_id}/insights");
        let request = ToolRequest::new(
            "list_insights",
            args(json!({"object_id": "act_1", "date_range": {"since": "2026-01-01"}})),
        );
        assert!(build_request(BASE, "v25.0", &endpoint, &request).is_err());
    }

    #[test]
    fn cursor_is_appended_after_normalization() {
        let endpoint = Endpoint::get("{ad_account_id}/campaigns").paginated();
        let request = ToolRequest::from_arguments(
            "list_campaigns",
            args(json!({"ad_account_id": "act_1", "page_cursor": "QVFIUa"})),
        )
        .unwrap();
        assert_eq!(request.page_cursor().map(PageCursor::as_str), Some("QVFIUa"));
        assert!(!request.parameters().contains_key("page_cursor"));

        let prepared = build(&endpoint, &request);
        assert_eq!(prepared.query.last().unwrap(), &("after".to_string(), "QVFIUa".to_string()));
    }

    #[test]
    fn defaults_do_not_override_caller_values() {
        let endpoint = Endpoint::get("{campaign_id}").with_defaults(&[("fields", "id,name")]);
        let caller = ToolRequest::new(
            "read_campaign",
            args(json!({"campaign_id": "1", "fields": "id,status"})),
        );
        assert_eq!(build(&endpoint, &caller).param("fields"), Some("id,status"));

        let defaulted = ToolRequest::new("read_campaign", args(json!({"campaign_id": "1"})));
        assert_eq!(build(&endpoint, &defaulted).param("fields"), Some("id,name"));
    }

    #[test]
    fn token_arguments_are_rejected() {
        let endpoint = Endpoint::get("me/adaccounts");
        let request = ToolRequest::new("list_ad_accounts", args(json!({"access_token": "EAAB"})));
        let err = build_request(BASE, "v25.0", &endpoint, &request).unwrap_err();
        assert!(!err.to_string().contains("EAAB"));
    }

    #[test]
    fn post_is_not_idempotent() {
        let endpoint = Endpoint::post("{ad_account_id}/campaigns");
        let request = ToolRequest::new("create_campaign", args(json!({"ad_account_id": "1", "name": "x"})));
        let prepared = build(&endpoint, &request);
        assert_eq!(prepared.method, HttpMethod::Post);
        assert!(!prepared.idempotent);
    }

    #[test]
    fn fingerprint_ignores_pagination_only() {
        let endpoint = Endpoint::get("{ad_account_id}/campaigns").paginated();
        let first = ToolRequest::new(
            "list_campaigns",
            args(json!({"ad_account_id": "1", "effective_status": ["ACTIVE"], "page_size": 10})),
        );
        let next = first
            .clone()
            .with_cursor(PageCursor::new("QVFIUa").unwrap());
        let other = ToolRequest::new(
            "list_campaigns",
            args(json!({"ad_account_id": "1", "effective_status": ["PAUSED"]})),
        );

        let fp = build(&endpoint, &first).fingerprint();
        assert_eq!(fp, build(&endpoint, &next).fingerprint());
        assert_ne!(fp, build(&endpoint, &other).fingerprint());
    }
}
